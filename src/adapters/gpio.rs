use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Low,
    High,
}

impl LineLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "0" => Some(Self::Low),
            "high" | "1" => Some(Self::High),
            _ => None,
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    fn sysfs_value(self) -> &'static str {
        match self {
            Self::Low => "0",
            Self::High => "1",
        }
    }

    fn sysfs_direction(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("failed to {action} gpio {pin}: {source}")]
    Io {
        pin: u32,
        action: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("gpio {pin} returned unexpected value {value:?}")]
    InvalidValue { pin: u32, value: String },
}

pub trait OutputLine: Send {
    fn pin(&self) -> u32;
    fn write(&mut self, level: LineLevel) -> Result<(), GpioError>;
    fn release(&mut self) -> Result<(), GpioError>;
}

pub trait InputLine: Send {
    fn pin(&self) -> u32;
    fn read(&mut self) -> Result<LineLevel, GpioError>;
    fn release(&mut self) -> Result<(), GpioError>;
}

#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn open_output(&self, pin: u32, initial: LineLevel) -> Result<SysfsLine, GpioError> {
        let line = self.export(pin)?;
        write_attr(&line.dir.join("direction"), initial.sysfs_direction())
            .map_err(|source| io_error(pin, "set direction of", source))?;
        Ok(line)
    }

    pub fn open_input(&self, pin: u32) -> Result<SysfsLine, GpioError> {
        let line = self.export(pin)?;
        write_attr(&line.dir.join("direction"), "in")
            .map_err(|source| io_error(pin, "set direction of", source))?;
        Ok(line)
    }

    fn export(&self, pin: u32) -> Result<SysfsLine, GpioError> {
        let dir = self.root.join(format!("gpio{pin}"));
        if !dir.exists() {
            write_attr(&self.root.join("export"), &pin.to_string())
                .map_err(|source| io_error(pin, "export", source))?;
        }

        Ok(SysfsLine {
            pin,
            root: self.root.clone(),
            dir,
            released: false,
        })
    }
}

#[derive(Debug)]
pub struct SysfsLine {
    pin: u32,
    root: PathBuf,
    dir: PathBuf,
    released: bool,
}

impl SysfsLine {
    fn value_path(&self) -> PathBuf {
        self.dir.join("value")
    }
}

impl OutputLine for SysfsLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn write(&mut self, level: LineLevel) -> Result<(), GpioError> {
        write_attr(&self.value_path(), level.sysfs_value())
            .map_err(|source| io_error(self.pin, "write", source))
    }

    fn release(&mut self) -> Result<(), GpioError> {
        unexport(self)
    }
}

impl InputLine for SysfsLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn read(&mut self) -> Result<LineLevel, GpioError> {
        let raw = fs::read_to_string(self.value_path())
            .map_err(|source| io_error(self.pin, "read", source))?;
        match raw.trim() {
            "0" => Ok(LineLevel::Low),
            "1" => Ok(LineLevel::High),
            other => Err(GpioError::InvalidValue {
                pin: self.pin,
                value: other.to_string(),
            }),
        }
    }

    fn release(&mut self) -> Result<(), GpioError> {
        unexport(self)
    }
}

fn unexport(line: &mut SysfsLine) -> Result<(), GpioError> {
    if line.released {
        return Ok(());
    }
    write_attr(&line.root.join("unexport"), &line.pin.to_string())
        .map_err(|source| io_error(line.pin, "unexport", source))?;
    line.released = true;
    Ok(())
}

fn write_attr(path: &Path, value: &str) -> io::Result<()> {
    fs::write(path, value)
}

fn io_error(pin: u32, action: &'static str, source: io::Error) -> GpioError {
    GpioError::Io {
        pin,
        action,
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{GpioError, InputLine, LineLevel, OutputLine, SysfsGpio};

    fn fake_sysfs(pins: &[u32]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        for pin in pins {
            let line = dir.path().join(format!("gpio{pin}"));
            fs::create_dir_all(&line).expect("line dir should be created");
            fs::write(line.join("direction"), "in").expect("direction file");
            fs::write(line.join("value"), "0").expect("value file");
        }
        dir
    }

    #[test]
    fn output_sets_initial_level_and_writes_values() {
        let root = fake_sysfs(&[17]);
        let gpio = SysfsGpio::new(root.path());

        let mut line = gpio
            .open_output(17, LineLevel::High)
            .expect("output should open");
        assert_eq!(
            fs::read_to_string(root.path().join("gpio17/direction")).expect("direction"),
            "high"
        );

        line.write(LineLevel::Low).expect("write should succeed");
        assert_eq!(
            fs::read_to_string(root.path().join("gpio17/value")).expect("value"),
            "0"
        );

        OutputLine::release(&mut line).expect("release should succeed");
        assert_eq!(
            fs::read_to_string(root.path().join("unexport")).expect("unexport"),
            "17"
        );
    }

    #[test]
    fn input_reads_levels() {
        let root = fake_sysfs(&[4]);
        let gpio = SysfsGpio::new(root.path());
        let mut line = gpio.open_input(4).expect("input should open");

        assert_eq!(line.read().expect("read"), LineLevel::Low);
        fs::write(root.path().join("gpio4/value"), "1\n").expect("value update");
        assert_eq!(line.read().expect("read"), LineLevel::High);

        fs::write(root.path().join("gpio4/value"), "x").expect("value update");
        assert!(matches!(
            line.read(),
            Err(GpioError::InvalidValue { pin: 4, .. })
        ));
    }

    #[test]
    fn unexported_pin_is_exported_first() {
        let root = fake_sysfs(&[]);
        let gpio = SysfsGpio::new(root.path());

        let result = gpio.open_output(22, LineLevel::Low);

        assert_eq!(
            fs::read_to_string(root.path().join("export")).expect("export"),
            "22"
        );
        // No kernel behind the fake root, so the line directory never appears.
        assert!(matches!(result, Err(GpioError::Io { pin: 22, .. })));
    }

    #[test]
    fn parses_levels() {
        assert_eq!(LineLevel::parse("HIGH"), Some(LineLevel::High));
        assert_eq!(LineLevel::parse("0"), Some(LineLevel::Low));
        assert_eq!(LineLevel::parse("up"), None);
        assert_eq!(LineLevel::Low.inverted(), LineLevel::High);
    }
}
