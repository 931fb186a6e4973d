use chrono::Local;
use env_logger::{ Env, Target };
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;

/// Installs the global logger. `RUST_LOG` overrides the default `info` filter.
/// With `log_file` set, lines are appended to that file instead of stderr.
pub fn init(log_file: Option<&str>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.target(),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}
