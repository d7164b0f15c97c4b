//! Device table and interactive device selection.

use anyhow::Result;

use super::prompt;
use super::style::{bold, cyan, yellow};
use crate::core::ResolvedDevice;

/// Result of parsing an operator's selection line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Zero-based indices, in the order typed, without duplicates.
    pub indices: Vec<usize>,
    /// Tokens that were not a valid 1-based device number.
    pub rejected: Vec<String>,
}

/// Parse `all`, an empty line, or space-separated 1-based device numbers.
pub fn parse_selection(raw: &str, count: usize) -> Selection {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("all") {
        return Selection {
            indices: (0..count).collect(),
            rejected: Vec::new(),
        };
    }

    let mut selection = Selection::default();
    for token in raw.split_whitespace() {
        match token.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => {
                if !selection.indices.contains(&(n - 1)) {
                    selection.indices.push(n - 1);
                }
            }
            _ => selection.rejected.push(token.to_string()),
        }
    }
    selection
}

pub fn print_device_table(devices: &[ResolvedDevice]) {
    println!();
    println!(
        "  {} {}  {}  {}  {}  {}",
        bold(&format!("{:<4}", "#")),
        bold(&format!("{:<12}", "Device")),
        bold(&format!("{:<8}", "Size")),
        bold(&format!("{:<22}", "Serial")),
        bold(&format!("{:<20}", "Model")),
        bold("Slot"),
    );
    println!(
        "  {} {}  {}  {}  {}  {}",
        "─".repeat(4),
        "─".repeat(12),
        "─".repeat(8),
        "─".repeat(22),
        "─".repeat(20),
        "─".repeat(4),
    );

    for (i, device) in devices.iter().enumerate() {
        println!(
            "  [{:<2}] {:<12}  {:<8}  {:<22}  {:<20}  {}",
            i + 1,
            device.path.display().to_string(),
            device.size,
            device.serial,
            device.model,
            cyan(&device.slot_label()),
        );
    }
    println!();
}

/// Ask the operator to pick devices from the table. Empty input cancels.
pub async fn choose_devices(
    devices: &[ResolvedDevice],
    question: &str,
) -> Result<Vec<ResolvedDevice>> {
    let raw = prompt(&bold(question)).await?;
    let selection = parse_selection(&raw, devices.len());

    for token in &selection.rejected {
        println!("  {}", yellow(&format!("Invalid: {} (skipping)", token)));
    }

    Ok(selection
        .indices
        .into_iter()
        .map(|i| devices[i].clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_every_device() {
        let sel = parse_selection(" ALL ", 3);
        assert_eq!(sel.indices, vec![0, 1, 2]);
        assert!(sel.rejected.is_empty());
    }

    #[test]
    fn empty_line_selects_nothing() {
        assert_eq!(parse_selection("", 5), Selection::default());
    }

    #[test]
    fn invalid_tokens_are_reported_and_skipped() {
        let sel = parse_selection("3 x 0 1 9 3", 4);
        assert_eq!(sel.indices, vec![2, 0]);
        assert_eq!(sel.rejected, vec!["x", "0", "9"]);
    }
}
