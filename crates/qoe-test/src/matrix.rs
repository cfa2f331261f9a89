//! Test matrix: the ordered list of scenarios a batch executes.
//!
//! One scenario per line, five comma-separated integers:
//!
//! ```text
//! test_id, dut_channel, dut_data_rate, interferer_channel, interferer_data_rate
//! 1, 1, 20000, 6, 0
//! 2, 1, 20000, 6, 40000
//! ```
//!
//! Data rates are in Kbps. The first blank line ends the matrix.

use crate::error::{QoeError, Result};
use std::fmt;
use std::path::Path;

/// One row of the test matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioDefinition {
    pub test_id: u32,
    pub dut_channel: u32,
    /// DUT traffic rate in Kbps (0 = no DUT traffic)
    pub dut_data_rate: u64,
    pub interferer_channel: u32,
    /// Interferer traffic rate in Kbps (0 = no interferer traffic)
    pub interferer_data_rate: u64,
}

impl ScenarioDefinition {
    /// Identifier used for every artifact of this scenario.
    #[must_use]
    pub fn scenario_id(&self) -> String {
        format!(
            "TP{}_dut_ch{}_{}_int_ch{}_{}",
            self.test_id,
            self.dut_channel,
            self.dut_data_rate,
            self.interferer_channel,
            self.interferer_data_rate
        )
    }
}

impl fmt::Display for ScenarioDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scenario_id())
    }
}

/// Parse test matrix text.
pub fn parse_matrix(text: &str) -> Result<Vec<ScenarioDefinition>> {
    let mut scenarios = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            break;
        }
        scenarios.push(parse_line(idx + 1, line)?);
    }
    Ok(scenarios)
}

/// Read and parse a test matrix file.
pub fn load_matrix(path: &Path) -> Result<Vec<ScenarioDefinition>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| QoeError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_matrix(&text)
}

fn parse_line(line_no: usize, line: &str) -> Result<ScenarioDefinition> {
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    if cells.len() != 5 {
        return Err(QoeError::Matrix {
            line: line_no,
            reason: format!("expected 5 fields, found {}", cells.len()),
        });
    }

    let int = |i: usize| -> Result<u64> {
        cells[i].parse::<u64>().map_err(|e| QoeError::Matrix {
            line: line_no,
            reason: format!("field {} ({:?}): {e}", i + 1, cells[i]),
        })
    };
    let small = |i: usize| -> Result<u32> {
        u32::try_from(int(i)?).map_err(|e| QoeError::Matrix {
            line: line_no,
            reason: format!("field {}: {e}", i + 1),
        })
    };

    Ok(ScenarioDefinition {
        test_id: small(0)?,
        dut_channel: small(1)?,
        dut_data_rate: int(2)?,
        interferer_channel: small(3)?,
        interferer_data_rate: int(4)?,
    })
}
