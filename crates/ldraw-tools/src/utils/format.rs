use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use glam::DVec3;

use crate::utils::color;

/// Condensed table that drops cell colours when colour is off.
pub fn table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if !color::enabled() {
        table.force_no_tty();
    }
    table
}

/// Coordinates with trailing zeros trimmed, `x y z`.
pub fn vec3(v: DVec3) -> String {
    [v.x, v.y, v.z].map(number).join(" ")
}

pub fn number(n: f64) -> String {
    let rounded = (n * 1000.0).round() / 1000.0;
    let s = format!("{:.3}", if rounded == 0.0 { 0.0 } else { rounded });
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_zeros() {
        assert_eq!(number(10.0), "10");
        assert_eq!(number(-0.0), "0");
        assert_eq!(number(-0.0001), "0");
        assert_eq!(number(0.5), "0.5");
        assert_eq!(number(1.23456), "1.235");
        assert_eq!(vec3(DVec3::new(0.0, -24.0, 1.5)), "0 -24 1.5");
    }
}
