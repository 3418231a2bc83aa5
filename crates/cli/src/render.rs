//! Console rendering for shell replies.

use tierkv_kv::{StatReport, VersionedValue};

const HEADERS: [&str; 3] = ["Address", "Status", "Key Count"];

/// Render a stat report as a bordered table, one row per replica.
pub fn stat_table(report: &StatReport) -> String {
    let rows: Vec<[String; 3]> = report
        .nodes
        .iter()
        .map(|node| {
            [
                node.endpoint.to_string(),
                node.status.to_string(),
                node.key_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let border = {
        let mut line = String::from("+");
        for width in widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    };
    let render_row = |cells: [&str; 3]| {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(widths) {
            line.push_str(&format!(" {:<width$} |", cell, width = width));
        }
        line
    };

    let mut out = vec![border.clone(), render_row(HEADERS), border.clone()];
    for row in &rows {
        out.push(render_row([row[0].as_str(), row[1].as_str(), row[2].as_str()]));
    }
    out.push(border);
    out.join("\n")
}

/// Render conflicting siblings under the error line.
pub fn siblings(siblings: &[VersionedValue]) -> String {
    siblings
        .iter()
        .map(|s| {
            let shown = if s.tombstone { "<deleted>" } else { s.value.as_str() };
            format!("  {} [{}]", shown, s.vector)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierkv_common::Endpoint;
    use tierkv_kv::{NodeStat, NodeStatus, VersionVector};

    #[test]
    fn test_stat_table_layout() {
        let report = StatReport {
            nodes: vec![
                NodeStat {
                    endpoint: Endpoint::new("127.0.0.1", 7000),
                    status: NodeStatus::Alive,
                    key_count: Some(12),
                },
                NodeStat {
                    endpoint: Endpoint::new("127.0.0.1", 7001),
                    status: NodeStatus::Unreachable,
                    key_count: None,
                },
            ],
        };
        let expected = [
            "+----------------+-------------+-----------+",
            "| Address        | Status      | Key Count |",
            "+----------------+-------------+-----------+",
            "| 127.0.0.1:7000 | alive       | 12        |",
            "| 127.0.0.1:7001 | unreachable | -         |",
            "+----------------+-------------+-----------+",
        ]
        .join("\n");
        assert_eq!(stat_table(&report), expected);
    }

    #[test]
    fn test_empty_table_has_header() {
        let table = stat_table(&StatReport::default());
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("| Address | Status | Key Count |"));
    }

    #[test]
    fn test_siblings_listing() {
        let listing = siblings(&[
            VersionedValue::live("x", VersionVector::from_counters([("a", 1)])),
            VersionedValue::tombstone(VersionVector::from_counters([("b", 2)])),
        ]);
        assert_eq!(listing, "  x [a:1]\n  <deleted> [b:2]");
    }
}
