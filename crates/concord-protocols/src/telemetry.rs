//! Telemetry line written to the serial link on every slow-path pass.
//!
//! `d<elapsed_ms>,<state>,<vstate>,<vartheta>[,<neighbor_value>...]\n\r`

use std::fmt;

use concord_consensus::TelemetrySnapshot;

/// Line terminator expected by the host tooling.
pub const LINE_END: &str = "\n\r";

/// Display adapter producing one telemetry line.
pub struct TelemetryLine<'a>(pub &'a TelemetrySnapshot);

impl fmt::Display for TelemetryLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(f, "d{},{},{},{}", s.elapsed_ms, s.state, s.vstate, s.vartheta)?;
        for value in &s.neighbor_values {
            write!(f, ",{}", value)?;
        }
        f.write_str(LINE_END)
    }
}

/// Format a snapshot as a telemetry line, terminator included.
pub fn encode_telemetry(snapshot: &TelemetrySnapshot) -> String {
    TelemetryLine(snapshot).to_string()
}
