use std::io::Write;
use std::path::Path;

use dishstat_core::{FieldValue, ObstructionMap};

use crate::output;

/// One CSV line per map row. Negative SNR marks cells with no data.
fn map_rows(map: &ObstructionMap) -> Vec<String> {
    map.rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|&snr| FieldValue::from(snr).render(false))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect()
}

pub fn run(target: Option<&str>, replay: Option<&Path>, out_file: Option<&Path>) {
    let mut gateway = super::make_gateway(target, replay);
    let map = match gateway.obstruction_map() {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    gateway.close();
    log::info!(
        "obstruction map: {} rows x {} columns",
        map.rows.len(),
        map.rows.first().map_or(0, Vec::len)
    );

    let mut out = match output::open_output(out_file) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error opening output file: {e}");
            std::process::exit(1);
        }
    };
    for line in map_rows(&map) {
        if let Err(e) = writeln!(out, "{line}") {
            eprintln!("Error writing map: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_render_as_csv() {
        let map = ObstructionMap {
            rows: vec![vec![1.0, -1.0], vec![0.5, 0.25]],
        };
        assert_eq!(map_rows(&map), vec!["1.0,-1.0", "0.5,0.25"]);
    }

    #[test]
    fn empty_map_has_no_rows() {
        assert!(map_rows(&ObstructionMap { rows: Vec::new() }).is_empty());
    }
}
