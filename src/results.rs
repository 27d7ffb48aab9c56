//! Post-simulation reporting: a per-miner stdout histogram plus an
//! attribution CSV, grounded in the teacher's `ResultsTable`-style aligned
//! plain-text formatter and the original model's
//! `calculate_percentage`/`print_attackers_success` helpers.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::io;

use crate::block::Block;
use crate::chain::Chain;
use crate::ids::MinerId;

/// Floating point precision of percentages in reported output.
pub const FLOAT_PRECISION_DIGITS: usize = 3;

/// One miner's row of the final histogram: `(miner_label, percentage,
/// win_count, block_count)`.
#[derive(Debug, Clone)]
pub struct MinerSummary {
    pub id: MinerId,
    pub name: String,
    pub wins: u64,
    pub blocks: u64,
    pub percentage: f64,
}

/// Builds the per-miner histogram described in `spec.md` §6: every miner's
/// share of blocks on the finalized main chain, its raw block count, and its
/// leader-election win count.
pub struct ResultsTable {
    rows: Vec<MinerSummary>,
}

impl ResultsTable {
    /// `names` must list every miner that participated, honest first.
    pub fn new(
        names: &[(MinerId, String)],
        wins: &HashMap<MinerId, u64>,
        block_counts: &HashMap<MinerId, u64>,
    ) -> Self {
        let total_blocks: u64 = block_counts.values().sum();

        let rows = names
            .iter()
            .map(|(id, name)| {
                let blocks = block_counts.get(id).copied().unwrap_or(0);
                let percentage = if total_blocks == 0 {
                    0.0
                } else {
                    (blocks as f64 / total_blocks as f64 * 100.0 * 1000.0).round() / 1000.0
                };

                MinerSummary {
                    id: *id,
                    name: name.clone(),
                    wins: wins.get(id).copied().unwrap_or(0),
                    blocks,
                    percentage,
                }
            })
            .collect();

        ResultsTable { rows }
    }

    pub fn rows(&self) -> &[MinerSummary] {
        &self.rows
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SEPARATOR_VERTICAL: char = '|';
        const SEPARATOR_HORIZONTAL: char = '-';

        let titles = ["Miner", "Percentage", "Wins", "Blocks"];
        let cells: Vec<[String; 4]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.name.clone(),
                    format!("{:.1$}", row.percentage, FLOAT_PRECISION_DIGITS),
                    row.wins.to_string(),
                    row.blocks.to_string(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = titles.iter().map(|t| t.len()).collect();
        for row in &cells {
            for (i, val) in row.iter().enumerate() {
                widths[i] = widths[i].max(val.len());
            }
        }

        for (i, title) in titles.iter().enumerate() {
            write!(f, " {:1$} {2}", title, widths[i], SEPARATOR_VERTICAL)?;
        }
        writeln!(f)?;

        let total_width: usize = widths.iter().map(|w| w + 3).sum();
        for _ in 0..total_width {
            write!(f, "{SEPARATOR_HORIZONTAL}")?;
        }

        for row in &cells {
            writeln!(f)?;
            for (i, val) in row.iter().enumerate() {
                write!(f, " {:1$} {2}", val, widths[i], SEPARATOR_VERTICAL)?;
            }
        }

        Ok(())
    }
}

/// Writes the `miner_id,blocks,percentage` attribution CSV used by Nakamoto,
/// Strongchain and Subchain.
pub fn write_block_csv<W: io::Write>(writer: W, table: &ResultsTable) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["miner_id", "blocks", "percentage"])?;
    for row in table.rows() {
        wtr.write_record([
            row.id.to_string(),
            row.blocks.to_string(),
            format!("{:.1$}", row.percentage, FLOAT_PRECISION_DIGITS),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the `miner_id,fruits` attribution CSV used by Fruitchain: one row
/// per block on the final main chain, with the fruit-owner ids it sealed
/// (empty for blocks that carry no parsable fruit payload, i.e. every
/// non-superblock).
pub fn write_fruit_csv<W: io::Write>(writer: W, main_chain: &Chain<Block>) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["miner_id", "fruits"])?;
    for block in &main_chain.chain {
        let fruits: Vec<MinerId> = serde_json::from_str(&block.payload).unwrap_or_default();
        let fruits = fruits.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(";");
        wtr.write_record([block.miner_id.to_string(), fruits])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<(MinerId, String)> {
        vec![(0, "Honest miner 0".into()), (1, "Selfish miner 1".into())]
    }

    #[test]
    fn percentage_reflects_block_share() {
        let wins = HashMap::from([(0, 5), (1, 3)]);
        let blocks = HashMap::from([(0, 75), (1, 25)]);
        let table = ResultsTable::new(&names(), &wins, &blocks);

        assert_eq!(table.rows()[0].percentage, 75.0);
        assert_eq!(table.rows()[1].percentage, 25.0);
    }

    #[test]
    fn zero_blocks_reports_zero_percentage() {
        let wins = HashMap::new();
        let blocks = HashMap::new();
        let table = ResultsTable::new(&names(), &wins, &blocks);

        assert_eq!(table.rows()[0].percentage, 0.0);
        assert_eq!(table.rows()[1].percentage, 0.0);
    }

    #[test]
    fn display_includes_every_miner_name() {
        let wins = HashMap::from([(0, 1), (1, 1)]);
        let blocks = HashMap::from([(0, 1), (1, 1)]);
        let table = ResultsTable::new(&names(), &wins, &blocks);
        let text = table.to_string();

        assert!(text.contains("Honest miner 0"));
        assert!(text.contains("Selfish miner 1"));
    }

    #[test]
    fn block_csv_has_expected_header_and_rows() {
        let wins = HashMap::from([(0, 1), (1, 1)]);
        let blocks = HashMap::from([(0, 1), (1, 1)]);
        let table = ResultsTable::new(&names(), &wins, &blocks);

        let mut buf = Vec::new();
        write_block_csv(&mut buf, &table).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("miner_id,blocks,percentage\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn fruit_csv_parses_superblock_payloads_and_blanks_others() {
        let mut chain: Chain<Block> = Chain::new("test");
        chain.add_block(Block::new("Block data", "Honest miner 0", 0, false));
        chain.add_block(Block::new("[1,1,2]", "Honest miner 0", 0, false));

        let mut buf = Vec::new();
        write_fruit_csv(&mut buf, &chain).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some("miner_id,fruits"));
        assert_eq!(lines.next(), Some("0,"));
        assert_eq!(lines.next(), Some("0,1;1;2"));
    }
}
