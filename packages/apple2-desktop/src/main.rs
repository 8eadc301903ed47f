use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};

use apple2_core::devices::bus::Motherboard;
use apple2_core::devices::cpu::CpuVariant;
use apple2_core::devices::disk::DiskController;
use apple2_core::devices::machine::Machine;
use apple2_core::devices::memory::{INTERNAL_ROM_SIZE, MAIN_ROM_SIZE};
use apple2_core::error::ConfigError;
use apple2_core::settings::Settings;

const DEFAULT_SETTINGS_PATH: &str = "apple2.settings";

/// Command-line host for the Apple ][/][+/][e emulator core.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ROM image path (12 KiB for ][/][+, 16 KiB for ][e)
    #[arg(short = 'r', long)]
    rom: PathBuf,

    /// Disk image to mount in slot 6 drive 1
    #[arg(short = 'd', long)]
    disk: Option<PathBuf>,

    /// Raw binary to load at a specified address
    #[arg(short = 'b', long, requires = "pc")]
    binary: Option<PathBuf>,

    /// Initial program counter, as a hex address (e.g. "0300")
    #[arg(short = 'p', long)]
    pc: Option<String>,

    /// Redirect log output to a file instead of stderr
    #[arg(short = 'l', long)]
    log: Option<PathBuf>,

    /// Opcode table variant to decode against
    #[arg(long, value_enum, default_value_t = CliCpuVariant::Nmos6502)]
    cpu: CliCpuVariant,

    /// Settings file location
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Number of instructions to execute before exiting (0 runs forever)
    #[arg(long, default_value_t = 0)]
    steps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliCpuVariant {
    #[value(name = "6502")]
    Nmos6502,
    #[value(name = "65c02")]
    Cmos65C02,
}

impl From<CliCpuVariant> for CpuVariant {
    fn from(v: CliCpuVariant) -> CpuVariant {
        match v {
            CliCpuVariant::Nmos6502 => CpuVariant::Nmos6502,
            CliCpuVariant::Cmos65C02 => CpuVariant::Cmos65C02,
        }
    }
}

fn parse_pc(s: &str) -> Result<u16, ConfigError> {
    u16::from_str_radix(s.trim_start_matches("0x").trim_start_matches('$'), 16).map_err(|_| ConfigError::InvalidPc(s.to_string()))
}

fn load_rom(path: &PathBuf) -> Result<(Vec<u8>, Vec<u8>), ConfigError> {
    let raw = fs::read(path).map_err(|e| ConfigError::UnreadableRom(path.clone(), e))?;
    match raw.len() {
        0x3000 => {
            // ][/][+: 12 KiB covering $D000-$FFFF. Pad the low $C000-$CFFF
            // with NOPs; it's I/O space on this machine, never code.
            let mut main_rom = vec![0xEAu8; apple2_core::devices::memory::LC_BANK_SIZE];
            main_rom.extend_from_slice(&raw);
            Ok((main_rom, vec![0xEA; INTERNAL_ROM_SIZE]))
        }
        MAIN_ROM_SIZE => {
            let internal_rom = raw[..INTERNAL_ROM_SIZE].to_vec();
            Ok((raw, internal_rom))
        }
        n => Err(ConfigError::UnexpectedRomSize(path.clone(), n)),
    }
}

fn run(args: Args) -> Result<(), ConfigError> {
    let settings = match Settings::load(&args.settings) {
        Ok(settings) => settings,
        Err(ConfigError::UnreadableSettings(path, _)) => {
            info!("no settings file at {:?}, using defaults", path);
            Settings::default()
        }
        Err(e) => return Err(e),
    };

    let variant = settings.emulator_type.unwrap_or_else(|| args.cpu.into());
    let (main_rom, internal_rom) = load_rom(&args.rom)?;
    let mut machine = Machine::new(main_rom, internal_rom, variant);

    let disk_path = args.disk.clone().or_else(|| settings.disk1.clone().map(PathBuf::from));
    if let Some(path) = disk_path {
        let mut controller = DiskController::default();
        match controller.current_drive_mut().insert(&path) {
            Ok(()) => machine.mount_disk_controller(6, controller),
            Err(e) => warn!("failed to mount {:?}: {}", path, e),
        }
    }

    if let Some(binary_path) = &args.binary {
        let data = fs::read(binary_path).map_err(|e| ConfigError::UnreadableBinary(binary_path.clone(), e))?;
        let load_pc = args.pc.as_deref().map(parse_pc).transpose()?.ok_or_else(|| ConfigError::InvalidPc("--binary requires --pc".to_string()))?;
        for (i, &byte) in data.iter().enumerate() {
            machine.write(load_pc.wrapping_add(i as u16), byte);
        }
        machine.cpu.state.pc = load_pc;
    } else {
        machine.reset();
        if let Some(pc) = &args.pc {
            machine.cpu.state.pc = parse_pc(pc)?;
        }
    }

    info!("booting at PC=${:04X}", machine.cpu.state.pc);

    let mut total_steps = 0u64;
    loop {
        if machine.stop_requested() || machine.cpu.trapped {
            break;
        }
        machine.step();
        total_steps += 1;
        if args.steps != 0 && total_steps >= args.steps {
            break;
        }
    }

    info!("stopped after {} instructions at PC=${:04X}", total_steps, machine.cpu.state.pc);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match &args.log {
        Some(path) => {
            let target = Box::new(fs::File::create(path).expect("could not create log file"));
            env_logger::Builder::from_default_env().target(env_logger::Target::Pipe(target)).init();
        }
        None => env_logger::init(),
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}
