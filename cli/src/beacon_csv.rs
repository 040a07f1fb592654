//! Beacon table files: `id,x,y,z` per line.
//!
//! Extra columns are ignored, blank lines and `#` comments are skipped and an
//! optional header line starting with `id` is allowed. Any other malformed
//! line is fatal.

use anyhow::{bail, Context, Result};
use nav_core::{BeaconMap, BeaconRow};
use std::path::Path;

pub fn parse_beacon_csv(text: &str) -> Result<Vec<BeaconRow>> {
    let mut rows = Vec::new();
    let mut seen_data = false;
    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if !seen_data && fields[0].eq_ignore_ascii_case("id") {
            seen_data = true;
            continue;
        }
        seen_data = true;
        if fields.len() < 4 {
            bail!("line {lineno}: expected id,x,y,z but found {} field(s)", fields.len());
        }
        let id: u32 = fields[0]
            .parse()
            .with_context(|| format!("line {lineno}: bad beacon id '{}'", fields[0]))?;
        let mut coords = [0.0; 3];
        for (c, field) in coords.iter_mut().zip(&fields[1..4]) {
            *c = field
                .parse()
                .with_context(|| format!("line {lineno}: bad coordinate '{field}'"))?;
        }
        rows.push(BeaconRow::new(id, coords[0], coords[1], coords[2]));
    }
    Ok(rows)
}

pub fn load_beacon_csv(path: &Path) -> Result<BeaconMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading beacon table {}", path.display()))?;
    let rows = parse_beacon_csv(&text).with_context(|| format!("parsing {}", path.display()))?;
    let map = BeaconMap::load(rows).with_context(|| format!("loading {}", path.display()))?;
    Ok(map)
}
