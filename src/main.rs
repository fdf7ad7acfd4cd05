use std::{env, error, fs, path::PathBuf, process};

use emu::config::{EmulatorConfig, LogTarget};
use emu::session::Session;

const USAGE: &str = "usage: armulator <image> [--base ADDR] [--budget N] [--memory BYTES] \
                     [--catch MASK] [--log FILE] [--verbose]";

#[derive(Debug)]
struct Args {
    image: PathBuf,
    base: u32,
    budget: Option<u64>,
    config: EmulatorConfig,
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("bad number {text:?}: {e}"))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = args.into_iter();
    let mut image = None;
    let mut base = 0;
    let mut budget = None;
    let mut config = EmulatorConfig::default();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--base" => {
                base = u32::try_from(parse_number(&value("--base")?)?)
                    .map_err(|_| "--base must fit in 32 bits".to_owned())?;
            }
            "--budget" => budget = Some(parse_number(&value("--budget")?)?),
            "--memory" => {
                config.memory_size = usize::try_from(parse_number(&value("--memory")?)?)
                    .map_err(|_| "--memory is too large".to_owned())?;
            }
            "--catch" => {
                config.vector_catch = u8::try_from(parse_number(&value("--catch")?)?)
                    .map_err(|_| "--catch is an 8-bit mask".to_owned())?;
            }
            "--log" => config.log_target = LogTarget::File(PathBuf::from(value("--log")?)),
            "--verbose" => config.verbose = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            path => image = Some(PathBuf::from(path)),
        }
    }

    Ok(Args {
        image: image.ok_or_else(|| USAGE.to_owned())?,
        base,
        budget,
        config,
    })
}

fn run(args: &Args) -> Result<(), Box<dyn error::Error>> {
    let image = fs::read(&args.image)?;

    let mut session = Session::new(&args.config)?;
    session.load_image(args.base, &image)?;
    session.cpu.set_pc(args.base);

    tracing::info!(
        "loaded {} bytes from {} at 0x{:08X}",
        image.len(),
        args.image.display(),
        args.base
    );

    let reason = match args.budget {
        Some(budget) => session.run_for(budget),
        None => session.run(),
    };

    let counters = session.cpu.counters();
    println!("stopped: {reason:?}");
    println!(
        "pc=0x{:08X} cpsr={} instructions={} cycles={}",
        session.cpu.pc(),
        session.cpu.cpsr(),
        counters.instructions,
        session.cpu.time()
    );
    for (i, value) in session.cpu.registers().as_array().iter().enumerate() {
        print!("r{i:<2}=0x{value:08X}{}", if i % 4 == 3 { "\n" } else { "  " });
    }

    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let _guard = match Session::global_init(&args.config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&args) {
        tracing::error!("{e}");
        eprintln!("{e}");
        process::exit(2);
    }
}
