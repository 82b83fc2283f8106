use bucketq::observability::{init_tracing, LogConfig};
use bucketq::{BackingLocation, QueueError, Store, StoreConfig};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "\
usage: bucketq <store-path> <command> [args]

commands:
  push <bucket> <value>...   append one value, or several in one transaction
  pop <bucket>               remove and print the oldest value
  peek <bucket>              print the oldest value without removing it
  count <bucket>             print the number of values
  list <bucket>              print all values as a JSON array
  delete <bucket>            delete an empty bucket

environment:
  BUCKETQ_SYNC=always|os     fsync every commit (default) or leave it to the OS
  RUST_LOG, BUCKETQ_LOG_JSON logging";

enum Command {
    Push { bucket: String, values: Vec<String> },
    Pop { bucket: String },
    Peek { bucket: String },
    Count { bucket: String },
    List { bucket: String },
    Delete { bucket: String },
}

impl Command {
    fn parse(name: &str, args: &[String]) -> Option<Command> {
        let bucket = || args.first().cloned();
        match (name, args.len()) {
            ("push", n) if n >= 2 => Some(Command::Push {
                bucket: args[0].clone(),
                values: args[1..].to_vec(),
            }),
            ("pop", 1) => bucket().map(|bucket| Command::Pop { bucket }),
            ("peek", 1) => bucket().map(|bucket| Command::Peek { bucket }),
            ("count", 1) => bucket().map(|bucket| Command::Count { bucket }),
            ("list", 1) => bucket().map(|bucket| Command::List { bucket }),
            ("delete", 1) => bucket().map(|bucket| Command::Delete { bucket }),
            _ => None,
        }
    }

    fn bucket(&self) -> &str {
        match self {
            Command::Push { bucket, .. }
            | Command::Pop { bucket }
            | Command::Peek { bucket }
            | Command::Count { bucket }
            | Command::List { bucket }
            | Command::Delete { bucket } => bucket,
        }
    }
}

fn run(path: PathBuf, command: Command) -> Result<(), QueueError> {
    let mut config = StoreConfig::from_env()?;
    config.location = BackingLocation::ExplicitPath { path };
    let store = Store::open(config)?;

    store.register(command.bucket())?;

    match command {
        Command::Push { bucket, values } => {
            if let [value] = values.as_slice() {
                let key = store.append(&bucket, value)?;
                println!("{}", key);
            } else {
                let result = store.append_bulk(&bucket, &values)?;
                println!("stored {}, skipped {}", result.stored, result.skipped);
            }
        }
        Command::Pop { bucket } => {
            if let Some(record) = store.pop_once(&bucket)? {
                println!("{}", String::from_utf8_lossy(&record.value));
            }
        }
        Command::Peek { bucket } => {
            if let Some(handle) = store.peek(&bucket)? {
                println!("{}", String::from_utf8_lossy(handle.value()));
            }
        }
        Command::Count { bucket } => println!("{}", store.count(&bucket)?),
        Command::List { bucket } => {
            let values: Vec<String> = store
                .drain_all(&bucket)?
                .iter()
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .collect();
            println!("{}", serde_json::Value::from(values));
        }
        Command::Delete { bucket } => store.delete_bucket(&bucket)?,
    }

    store.close()
}

fn main() -> ExitCode {
    init_tracing(&LogConfig::from_env());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match args.as_slice() {
        [path, name, rest @ ..] => Command::parse(name, rest).map(|c| (PathBuf::from(path), c)),
        _ => None,
    };
    let Some((path, command)) = parsed else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    match run(path, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bucketq: {}", e);
            ExitCode::FAILURE
        }
    }
}
