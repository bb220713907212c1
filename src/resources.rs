use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// A CPU/memory quantity pair.
///
/// CPU is stored as integer millicores, memory as integer bytes. A zero
/// component means "unspecified" when describing a job and "none used" when
/// describing the ledger; callers distinguish the two by position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "cpu")]
    pub cpu_millicores: u64,
    #[serde(rename = "memory")]
    pub memory_bytes: u64,
}

impl Resources {
    pub fn new(cpu_millicores: u64, memory_bytes: u64) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// Parse a human-readable CPU and memory pair.
    ///
    /// CPU accepts a decimal number of cores (`"1"`, `"0.5"`) or integer
    /// millicores with an `m` suffix (`"250m"`). Memory accepts an integer
    /// with an optional case-insensitive binary suffix (`Kb`, `Mb`, `Gb`,
    /// `Tb`). The empty string parses to zero for both fields.
    pub fn parse(cpu: &str, memory: &str) -> Result<Self> {
        Ok(Self {
            cpu_millicores: parse_cpu(cpu)?,
            memory_bytes: parse_memory(memory)?,
        })
    }

    /// Render back to the `(cpu, memory)` string pair accepted by `parse`.
    pub fn render(&self) -> (String, String) {
        let cpu = if self.cpu_millicores % 1000 == 0 {
            format!("{}", self.cpu_millicores / 1000)
        } else {
            format!("{}m", self.cpu_millicores)
        };
        let memory = match self.memory_bytes {
            b if b > 0 && b % TIB == 0 => format!("{}Tb", b / TIB),
            b if b > 0 && b % GIB == 0 => format!("{}Gb", b / GIB),
            b if b > 0 && b % MIB == 0 => format!("{}Mb", b / MIB),
            b if b > 0 && b % KIB == 0 => format!("{}Kb", b / KIB),
            b => format!("{}", b),
        };
        (cpu, memory)
    }

    pub fn is_zero(&self) -> bool {
        self.cpu_millicores == 0 && self.memory_bytes == 0
    }

    pub fn add(&self, other: Resources) -> Resources {
        Resources {
            cpu_millicores: self.cpu_millicores.saturating_add(other.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
        }
    }

    /// Component-wise subtraction that never goes negative.
    pub fn saturating_sub(&self, other: Resources) -> Resources {
        Resources {
            cpu_millicores: self.cpu_millicores.saturating_sub(other.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
        }
    }

    /// Component-wise `<=`.
    pub fn less_or_equal(&self, other: Resources) -> bool {
        self.cpu_millicores <= other.cpu_millicores && self.memory_bytes <= other.memory_bytes
    }

    /// Component-wise `<=` against a limit where a zero limit component
    /// means "no bound on this dimension".
    pub fn within_limits(&self, limits: Resources) -> bool {
        (limits.cpu_millicores == 0 || self.cpu_millicores <= limits.cpu_millicores)
            && (limits.memory_bytes == 0 || self.memory_bytes <= limits.memory_bytes)
    }

    /// Fraction of a system total used by this quantity, per dimension.
    ///
    /// A zero total component yields a fraction of 0 for that dimension.
    /// Results are clamped to `[0, 1]`.
    pub fn ratio_against_total(&self, total: Resources) -> (f64, f64) {
        let frac = |used: u64, total: u64| -> f64 {
            if total == 0 {
                0.0
            } else {
                (used as f64 / total as f64).min(1.0)
            }
        };
        (
            frac(self.cpu_millicores, total.cpu_millicores),
            frac(self.memory_bytes, total.memory_bytes),
        )
    }
}

impl std::fmt::Display for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (cpu, memory) = self.render();
        write!(f, "cpu={} memory={}", cpu, memory)
    }
}

fn parse_cpu(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(0);
    }
    if let Some(millis) = input.strip_suffix('m') {
        return millis
            .parse::<u64>()
            .map_err(|_| NodeError::InvalidResourceSyntax(format!("cpu quantity {:?}", input)));
    }
    let cores: f64 = input
        .parse()
        .map_err(|_| NodeError::InvalidResourceSyntax(format!("cpu quantity {:?}", input)))?;
    if !cores.is_finite() || cores < 0.0 {
        return Err(NodeError::InvalidResourceSyntax(format!(
            "cpu quantity {:?}",
            input
        )));
    }
    Ok((cores * 1000.0).round() as u64)
}

fn parse_memory(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(0);
    }
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| NodeError::InvalidResourceSyntax(format!("memory quantity {:?}", input)))?;
    let multiplier = match suffix.to_ascii_lowercase().as_str() {
        "" => 1,
        "kb" => KIB,
        "mb" => MIB,
        "gb" => GIB,
        "tb" => TIB,
        _ => {
            return Err(NodeError::InvalidResourceSyntax(format!(
                "memory quantity {:?}",
                input
            )))
        }
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| NodeError::InvalidResourceSyntax(format!("memory quantity {:?}", input)))
}
