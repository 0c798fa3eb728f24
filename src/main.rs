use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use hidapi::HidApi;
use log::{info, LevelFilter};
use photonctl::hid::{list_devices, open_device, parse_hex_u16};
use photonctl::{
    Conf, DeviceSelector, Framing, ShamrockLibrary, Spectrometer, Spectrum, StradusAscii,
    StradusCmd, StradusLaser,
};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::{path::PathBuf, process::ExitCode, str::FromStr};

/// Stradus laser and Shamrock spectrograph control.
#[derive(Parser)]
#[command(name = "photonctl", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stradus laser over USB HID
    Laser(LaserArgs),
    /// Shamrock spectrograph through the vendor library
    Spectrometer(SpectrometerArgs),
}

#[derive(clap::Args)]
struct LaserArgs {
    /// Report framing
    #[arg(long, value_enum)]
    framing: Option<Framing>,
    /// List HID devices and exit
    #[arg(long)]
    list: bool,
    /// HID device path (string or b'...' literal)
    #[arg(long)]
    path: Option<String>,
    /// Vendor ID (e.g. 0x0C80)
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,
    /// Product ID (e.g. 0x0001)
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,
    /// Read timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<i32>,
    /// Append an XOR checksum to command frames
    #[arg(long)]
    crc: bool,
    #[command(subcommand)]
    action: Option<LaserAction>,
}

#[derive(Subcommand, Clone, Copy)]
enum LaserAction {
    On,
    Off,
    /// Set output power in mW
    Power { mw: f64 },
    Status,
}

#[derive(clap::Args)]
struct SpectrometerArgs {
    /// Device index
    #[arg(long)]
    device: Option<i32>,
    /// Path to the vendor library
    #[arg(long)]
    library: Option<PathBuf>,
    #[command(subcommand)]
    action: SpectrometerAction,
}

#[derive(Subcommand)]
enum SpectrometerAction {
    /// Initialize and close
    Init,
    /// Number of devices and serial of the current one
    Info,
    /// Wavelength limits (nm)
    Limits,
    /// Number of CCD pixels
    Pixels,
    /// First 10 wavelength calibration points
    Calib,
    /// Current grating index
    GetGrating,
    /// Current central wavelength (nm)
    GetWavelength,
    /// Set grating index
    Grating { g: i32 },
    /// Set central wavelength (nm)
    Wavelength { nm: f64 },
    /// Acquire a spectrum and save it as CSV
    Acquire {
        /// Lower wavelength bound (nm)
        #[arg(long)]
        start: Option<f64>,
        /// Upper wavelength bound (nm)
        #[arg(long)]
        end: Option<f64>,
        /// Resample to this many evenly spaced points
        #[arg(long)]
        points: Option<usize>,
        /// CSV output path
        #[arg(long)]
        outfile: Option<PathBuf>,
    },
}

fn init_logging(conf: &Conf, verbose: u8) -> Result<()> {
    let base = LevelFilter::from_str(&conf.logging.level)
        .with_context(|| format!("Invalid log level '{}'", conf.logging.level))?;
    let level = match verbose {
        0 => base,
        1 => base.max(LevelFilter::Debug),
        _ => LevelFilter::Trace,
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    if let Some(path) = &conf.logging.file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(level, Config::default(), file));
    }
    CombinedLogger::init(loggers).context("Failed to initialize logger")?;
    Ok(())
}

fn run_laser(conf: &Conf, args: &LaserArgs) -> Result<ExitCode> {
    let api = HidApi::new().context("Failed to initialize HidApi")?;
    if args.list {
        print!("{}", list_devices(&api));
        return Ok(ExitCode::SUCCESS);
    }

    let Some(action) = args.action else {
        let mut cmd = Cli::command();
        if let Some(laser) = cmd.find_subcommand_mut("laser") {
            laser.print_help()?;
        }
        return Ok(ExitCode::from(1));
    };

    let settings = &conf.laser;
    let selector = DeviceSelector::resolve(
        args.path.as_deref().or(settings.path.as_deref()),
        args.vid.or(settings.vid),
        args.pid.or(settings.pid),
    )?;
    let device = open_device(&api, &selector).context("Failed to open laser HID device")?;

    let timeout_ms = args.timeout_ms.unwrap_or(settings.timeout_ms);
    let framing = args.framing.unwrap_or(settings.framing);
    info!("Using {framing:?} framing, {timeout_ms} ms timeout");
    let mut laser: Box<dyn StradusLaser> = match framing {
        Framing::Ascii => Box::new(StradusAscii::new(device, settings.layout(), timeout_ms)),
        Framing::Cmd => Box::new(StradusCmd::new(
            device,
            settings.layout(),
            timeout_ms,
            args.crc || settings.crc,
        )),
    };

    let reply = match action {
        LaserAction::On => laser.laser_on(),
        LaserAction::Off => laser.laser_off(),
        LaserAction::Power { mw } => laser.set_power(mw),
        LaserAction::Status => laser.status(),
    }
    .context("Laser command failed")?;
    println!("{reply}");
    Ok(ExitCode::SUCCESS)
}

fn run_spectrometer(conf: &Conf, args: SpectrometerArgs) -> Result<ExitCode> {
    let settings = &conf.spectrometer;
    let library = args.library.as_deref().or(settings.library.as_deref());
    let sdk = ShamrockLibrary::load(library)?;
    let spec = Spectrometer::open(sdk, args.device.unwrap_or(settings.device))?;

    // closing must happen whether or not the action succeeded
    let result = spectrometer_action(&spec, args.action, settings.outfile.clone());
    let closed = spec.close();
    result?;
    closed?;
    Ok(ExitCode::SUCCESS)
}

fn spectrometer_action(
    spec: &Spectrometer<ShamrockLibrary>,
    action: SpectrometerAction,
    default_outfile: PathBuf,
) -> Result<()> {
    match action {
        SpectrometerAction::Init => println!("Initialized."),
        SpectrometerAction::Info => {
            println!("Devices: {}", spec.device_count()?);
            match spec.serial(None) {
                Ok(serial) => println!("Serial : {serial}"),
                Err(e) => println!("Serial : <unavailable> {e}"),
            }
        }
        SpectrometerAction::Limits => {
            let (lo, hi) = spec.wavelength_limits()?;
            println!("Wavelength limits: {lo:.2} .. {hi:.2} nm");
        }
        SpectrometerAction::Pixels => println!("Pixels = {}", spec.pixel_count()?),
        SpectrometerAction::Calib => {
            let calib = spec.calibration()?;
            println!("First 10 wavelength calib: {}  ...", calibration_head(&calib));
        }
        SpectrometerAction::GetGrating => println!("Grating = {}", spec.grating()?),
        SpectrometerAction::GetWavelength => {
            println!("Wavelength = {:.3} nm", spec.wavelength()?)
        }
        SpectrometerAction::Grating { g } => {
            spec.set_grating(g)?;
            println!("Grating set to {g}");
        }
        SpectrometerAction::Wavelength { nm } => {
            spec.set_wavelength(nm)?;
            println!("Wavelength set to {nm:.3} nm");
        }
        SpectrometerAction::Acquire {
            start,
            end,
            points,
            outfile,
        } => {
            let intensities = spec.acquire()?;
            let wavelengths = spec.calibration()?;
            let spectrum = Spectrum::from_parts(wavelengths, intensities)
                .window(start, end)
                .resample(points.unwrap_or(0));
            let outfile = outfile.unwrap_or(default_outfile);
            spectrum
                .write_csv(&outfile)
                .with_context(|| format!("Failed to write {}", outfile.display()))?;
            println!("Saved CSV -> {}", outfile.display());
        }
    }
    Ok(())
}

/// First ten points rounded to 3 decimals, without trailing zeros
/// (`[598.0, 598.512]`).
fn calibration_head(calib: &[f64]) -> String {
    let head: Vec<String> = calib
        .iter()
        .take(10)
        .map(|x| format!("{:?}", (x * 1000.0).round() / 1000.0))
        .collect();
    format!("[{}]", head.join(", "))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let conf = Conf::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&conf, cli.verbose)?;

    match cli.command {
        Commands::Laser(args) => run_laser(&conf, &args),
        Commands::Spectrometer(args) => run_spectrometer(&conf, args),
    }
}
