use crate::error::SweepError;
use crate::models::SummaryStats;
use crate::params::ParameterSet;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

const STAT_COLUMNS: [&str; 4] = ["total_trades", "net_profit", "win_rate", "max_drawdown"];

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub symbol: Option<String>,
    pub parameters: ParameterSet,
    pub stats: SummaryStats,
}

/// Append-only sweep results, kept in insertion order and flushed once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    // `+ 0.0` folds a rounded -0.0 into 0.0
    (value * factor).round() / factor + 0.0
}

pub fn format_money(value: f64) -> String {
    format!("{:.2}", round_to(value, 2))
}

pub fn format_ratio(value: f64) -> String {
    format!("{:.4}", round_to(value, 4))
}

pub fn default_report_path(output_dir: &Path, strategy: &str) -> PathBuf {
    output_dir.join(format!("{}_results.csv", strategy))
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parameter names in first-seen order.
    fn parameter_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for row in &self.rows {
            for name in row.parameters.names() {
                if !columns.contains(&name) {
                    columns.push(name);
                }
            }
        }
        columns
    }

    fn has_symbols(&self) -> bool {
        self.rows.iter().any(|row| row.symbol.is_some())
    }

    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = self
            .parameter_columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        header.extend(STAT_COLUMNS.iter().map(|c| c.to_string()));
        if self.has_symbols() {
            header.push("symbol".to_string());
        }
        header
    }

    /// Rendered cells; rounding happens here and nowhere else.
    pub fn records(&self) -> Vec<Vec<String>> {
        let parameter_columns = self.parameter_columns();
        let has_symbols = self.has_symbols();
        self.rows
            .iter()
            .map(|row| {
                let mut record: Vec<String> = parameter_columns
                    .iter()
                    .map(|name| {
                        row.parameters
                            .get(name)
                            .map(|value| value.to_string())
                            .unwrap_or_default()
                    })
                    .collect();
                record.push(row.stats.total_trades.to_string());
                record.push(format_money(row.stats.net_profit));
                record.push(format_ratio(row.stats.win_rate));
                record.push(format_money(row.stats.max_drawdown));
                if has_symbols {
                    record.push(row.symbol.clone().unwrap_or_default());
                }
                record
            })
            .collect()
    }

    /// Best rows by net profit; ties keep sweep order.
    pub fn top_by_net_profit(&self, limit: usize) -> Vec<&ResultRow> {
        let mut ranked: Vec<&ResultRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| b.stats.net_profit.total_cmp(&a.stats.net_profit));
        ranked.truncate(limit);
        ranked
    }

    /// Write the whole table as CSV next to `path`, then move it into place so
    /// readers never see a partial report.
    pub fn write_csv(&self, path: &Path) -> Result<(), SweepError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|error| SweepError::persistence(parent, error))?;
            }
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| SweepError::persistence(path, "report path has no file name"))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let write = || -> Result<(), csv::Error> {
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            writer.write_record(self.header())?;
            for record in self.records() {
                writer.write_record(&record)?;
            }
            writer.flush()?;
            Ok(())
        };
        if let Err(error) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(SweepError::persistence(path, error));
        }

        fs::rename(&tmp_path, path).map_err(|error| SweepError::persistence(path, error))?;
        info!("Wrote {} result row(s) to {}", self.rows.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParameterSpec, ParameterValue};
    use tempfile::tempdir;

    fn row(length: i64, net_profit: f64, symbol: Option<&str>) -> ResultRow {
        let specs = vec![
            ParameterSpec::integer("length", 1, 100, &[10]),
            ParameterSpec::choice("ma_type", &["SMA", "EMA"], &["SMA"]),
        ];
        let parameters = ParameterSet::new(
            &specs,
            vec![
                ("length".to_string(), ParameterValue::Int(length)),
                ("ma_type".to_string(), "EMA".into()),
            ],
        )
        .unwrap();
        ResultRow {
            symbol: symbol.map(str::to_string),
            parameters,
            stats: SummaryStats {
                total_trades: 3,
                net_profit,
                win_rate: 2.0 / 3.0,
                max_drawdown: -1.23456,
            },
        }
    }

    #[test]
    fn rounds_only_when_rendering() {
        let mut table = ResultsTable::new();
        table.push(row(9, 4.199999999, None));

        assert_eq!(
            table.header(),
            vec!["length", "ma_type", "total_trades", "net_profit", "win_rate", "max_drawdown"]
        );
        assert_eq!(
            table.records()[0],
            vec!["9", "EMA", "3", "4.20", "0.6667", "-1.23"]
        );
        assert_eq!(table.rows()[0].stats.net_profit, 4.199999999);
        assert_eq!(format_money(-0.001), "0.00");
    }

    #[test]
    fn symbol_column_appears_when_rows_carry_one() {
        let mut table = ResultsTable::new();
        table.push(row(9, 1.0, Some("EURUSD")));
        table.push(row(10, 2.0, Some("USDJPY")));
        assert_eq!(table.header().last().map(String::as_str), Some("symbol"));
        assert_eq!(table.records()[1].last().map(String::as_str), Some("USDJPY"));
    }

    #[test]
    fn top_rows_are_ranked_by_net_profit() {
        let mut table = ResultsTable::new();
        table.push(row(1, -2.0, None));
        table.push(row(2, 5.0, None));
        table.push(row(3, 5.0, None));
        table.push(row(4, 1.0, None));

        let top: Vec<_> = table
            .top_by_net_profit(3)
            .iter()
            .map(|r| r.parameters.get("length").cloned())
            .collect();
        assert_eq!(
            top,
            vec![
                Some(ParameterValue::Int(2)),
                Some(ParameterValue::Int(3)),
                Some(ParameterValue::Int(4))
            ]
        );
    }

    #[test]
    fn write_csv_replaces_report_atomically() {
        let dir = tempdir().unwrap();
        let path = default_report_path(&dir.path().join("output"), "rci");
        let mut table = ResultsTable::new();
        table.push(row(9, 4.2, None));
        table.push(row(10, -1.0, None));
        table.write_csv(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "length,ma_type,total_trades,net_profit,win_rate,max_drawdown",
                "9,EMA,3,4.20,0.6667,-1.23",
                "10,EMA,3,-1.00,0.6667,-1.23",
            ]
        );
        assert!(!dir.path().join("output").join("rci_results.csv.tmp").exists());
    }

    #[test]
    fn empty_table_writes_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        ResultsTable::new().write_csv(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written.trim_end(),
            "total_trades,net_profit,win_rate,max_drawdown"
        );
    }

    #[test]
    fn unwritable_destination_is_a_persistence_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let error = ResultsTable::new()
            .write_csv(&blocker.join("report.csv"))
            .unwrap_err();
        assert!(matches!(error, SweepError::Persistence { .. }));
    }
}
