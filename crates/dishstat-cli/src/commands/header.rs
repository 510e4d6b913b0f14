use std::io::Write;
use std::path::Path;

use dishstat_core::{Mode, ModeSet};

use crate::output;

pub fn run(modes: &[Mode], out_file: Option<&Path>) {
    let modes: ModeSet = modes.iter().copied().collect();
    if modes.is_empty() {
        eprintln!("Error: no modes selected");
        std::process::exit(1);
    }

    let mut out = match output::open_output(out_file) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error opening output file: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = writeln!(out, "{}", output::header(&modes).join(",")) {
        eprintln!("Error writing header: {e}");
        std::process::exit(1);
    }
}
