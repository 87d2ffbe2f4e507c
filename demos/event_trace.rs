use clap::Parser;
use fw_telemetry_parser::event_trace::EventTraceDecoder;
use fw_telemetry_parser::types::FormatVersion;
use std::{fs, path::PathBuf};
use tabular::{Row, Table};
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[clap(name = "event trace example", version, about = "Decode an event trace buffer from file", long_about = None)]
pub struct Opts {
    /// Print the events the schema declares and exit
    #[clap(long)]
    pub list_events: bool,

    /// Print the decoded events as JSON
    #[clap(long)]
    pub json: bool,

    /// Byte offset of the first record in the buffer file
    #[clap(long, value_parser=clap_num::maybe_hex::<usize>, default_value_t = 0)]
    pub offset: usize,

    /// Format version reported by the device, as MAJOR.MINOR
    #[clap(long)]
    pub device_version: Option<String>,

    /// Path to the event trace schema (JSON)
    #[clap(value_parser)]
    pub schema: PathBuf,

    /// Path to the raw event trace buffer
    #[clap(value_parser)]
    pub buffer: Option<PathBuf>,
}

fn main() {
    match do_main() {
        Ok(()) => (),
        Err(e) => {
            eprintln!("{e}");
            let mut cause = e.source();
            while let Some(err) = cause {
                eprintln!("Caused by: {err}");
                cause = err.source();
            }
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    reset_signal_pipe_handler()?;

    tracing_subscriber::fmt::init();

    let decoder = EventTraceDecoder::from_slice(&fs::read(&opts.schema)?)?;
    let schema = decoder.schema();
    info!(
        version = %schema.version,
        record_size = decoder.record_size(),
        "Loaded schema"
    );

    if let Some(v) = opts.device_version.as_deref() {
        let (major, minor) = v.split_once('.').ok_or("Expected MAJOR.MINOR")?;
        schema.check_version(FormatVersion::new(major.parse()?, minor.parse()?));
    }

    if opts.list_events {
        let mut table = Table::new("{:>}  {:<}  {:<}  {:<}");
        table.add_row(
            Row::new()
                .with_cell("ID")
                .with_cell("Name")
                .with_cell("Categories")
                .with_cell("Arguments"),
        );
        for (id, ev) in schema.events.iter() {
            table.add_row(
                Row::new()
                    .with_cell(id)
                    .with_cell(&ev.name)
                    .with_cell(ev.categories.join("|"))
                    .with_cell(
                        ev.args
                            .iter()
                            .map(|a| format!("{}[{}:{}]", a.name, a.start, a.bit_width))
                            .collect::<Vec<_>>()
                            .join(" "),
                    ),
            );
        }
        print!("{table}");
        return Ok(());
    }

    let path = opts.buffer.ok_or("Missing buffer path")?;
    let data = fs::read(path)?;
    let buf = data.get(opts.offset..).unwrap_or(&[]);

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&decoder.decode_tree(buf))?);
    } else {
        print!("{}", decoder.render(buf));
    }

    Ok(())
}

// Used to prevent panics on broken pipes.
// See:
//   https://github.com/rust-lang/rust/issues/46016#issuecomment-605624865
fn reset_signal_pipe_handler() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(target_family = "unix")]
    {
        use nix::sys::signal;

        unsafe {
            signal::signal(signal::Signal::SIGPIPE, signal::SigHandler::SigDfl)?;
        }
    }

    Ok(())
}
