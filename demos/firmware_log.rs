use clap::Parser;
use fw_telemetry_parser::firmware_log::FirmwareLogDecoder;
use std::{fs, num::NonZeroUsize, path::PathBuf};
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[clap(name = "firmware log example", version, about = "Decode a firmware log buffer from file", long_about = None)]
pub struct Opts {
    /// Debug print
    #[clap(long)]
    pub debug: bool,

    /// Resynchronization step for framed buffers
    #[clap(long, value_parser=clap_num::maybe_hex::<usize>)]
    pub scan_step: Option<usize>,

    /// Path to the firmware log schema (JSON)
    #[clap(value_parser)]
    pub schema: PathBuf,

    /// Path to the raw firmware log buffer
    #[clap(value_parser)]
    pub buffer: PathBuf,
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

    let mut decoder = FirmwareLogDecoder::from_slice(&fs::read(&opts.schema)?)?;
    if let Some(step) = opts.scan_step {
        let step = NonZeroUsize::new(step).ok_or("Scan step must be non-zero")?;
        decoder = decoder.with_scan_step(step);
    }
    info!(
        generation = %decoder.generation(),
        header_size = decoder.header_size(),
        "Loaded schema"
    );

    let buf = fs::read(&opts.buffer)?;
    if opts.debug {
        let rows = decoder.decode(&buf);
        info!(consumed = rows.consumed, size = buf.len(), "Decoded buffer");
        for row in rows.iter() {
            println!("{row:#?}");
        }
    } else {
        print!("{}", decoder.render(&buf));
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
