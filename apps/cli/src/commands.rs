//! Command-line operation parsing and file handling.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use cc1800_core::{Operation, ReadSink};
use tracing::info;

/// One parsed command, before any file has been touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Write { address: u32, file: PathBuf },
    Read { address: u32, length: u32, file: PathBuf },
    Exec,
}

/// Parse a number with an optional `0x` prefix.
pub fn parse_u32(s: &str) -> Result<u32> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|_| anyhow!("bad value '{}'", s))
}

fn next_arg<'a>(
    tokens: &mut impl Iterator<Item = &'a String>,
    command: &str,
    what: &str,
) -> Result<&'a String> {
    tokens
        .next()
        .ok_or_else(|| anyhow!("{} command requires {}", command, what))
}

/// Turn the trailing command tokens into commands.
pub fn parse_commands(tokens: &[String]) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        let command = match token.as_str() {
            "write" => {
                let usage = "two arguments (address and file name)";
                let address = parse_u32(next_arg(&mut iter, "write", usage)?)?;
                let file = PathBuf::from(next_arg(&mut iter, "write", usage)?);
                Command::Write { address, file }
            }
            "read" => {
                let usage = "three arguments (address, length and file name)";
                let address = parse_u32(next_arg(&mut iter, "read", usage)?)?;
                let length = parse_u32(next_arg(&mut iter, "read", usage)?)?;
                let file = PathBuf::from(next_arg(&mut iter, "read", usage)?);
                Command::Read {
                    address,
                    length,
                    file,
                }
            }
            "exec" => Command::Exec,
            other => bail!("unknown command '{}'", other),
        };
        commands.push(command);
    }

    Ok(commands)
}

/// Load `write` payloads and build the operation list.
///
/// Also returns the output file of every `read`, keyed by operation index.
pub fn load_operations(commands: &[Command]) -> Result<(Vec<Operation>, FileSink)> {
    let mut operations = Vec::with_capacity(commands.len());
    let mut outputs = HashMap::new();

    for (index, command) in commands.iter().enumerate() {
        let op = match command {
            Command::Write { address, file } => {
                let data = std::fs::read(file)
                    .with_context(|| format!("cannot read file '{}'", file.display()))?;
                info!(file = %file.display(), bytes = data.len(), "Loaded file");
                Operation::Write {
                    address: *address,
                    data,
                }
            }
            Command::Read {
                address,
                length,
                file,
            } => {
                outputs.insert(index, file.clone());
                Operation::Read {
                    address: *address,
                    length: *length,
                }
            }
            Command::Exec => Operation::Exec,
        };
        operations.push(op);
    }

    Ok((operations, FileSink { outputs }))
}

/// Saves each downloaded buffer to the file named on the command line.
#[derive(Debug, Default)]
pub struct FileSink {
    outputs: HashMap<usize, PathBuf>,
}

impl ReadSink for FileSink {
    fn persist(&mut self, index: usize, address: u32, data: Vec<u8>) -> io::Result<()> {
        let path = self.outputs.get(&index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no output file for operation {}", index),
            )
        })?;
        std::fs::write(path, &data)?;
        info!(
            file = %path.display(),
            address = %format!("0x{:08X}", address),
            bytes = data.len(),
            "Saved file"
        );
        Ok(())
    }
}
