//! 结果打印器
//!
//! 提供表格和垂直格式的结果输出

use crate::import::ImportStats;
use crate::query::{ExecuteResponse, ExecutionPlan, QueryNode};
use crate::store::Definitions;
use prettytable::{format, row, Cell, Row, Table};

/// 打印模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    /// 表格模式
    Table,
    /// 垂直模式
    Vertical,
}

/// 结果打印器
pub struct Printer {
    mode: PrintMode,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(PrintMode::Table)
    }
}

impl Printer {
    pub fn new(mode: PrintMode) -> Self {
        Self { mode }
    }

    /// 打印执行结果
    ///
    /// `order_column` 的取值与 `resp.results` 一一对应，作为排序列输出。
    pub fn print_response(
        &self,
        resp: &ExecuteResponse,
        order_column: Option<(&str, &[String])>,
        offset: usize,
        execution_time_ms: u64,
    ) -> String {
        if resp.results.is_empty() {
            return format!("Empty set, {} total ({} ms)\n", resp.count, execution_time_ms);
        }

        let mut columns = vec!["#".to_string(), "id".to_string()];
        if let Some((name, _)) = order_column {
            columns.push(name.to_string());
        }
        let rows: Vec<Vec<String>> = resp
            .results
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut row = vec![(offset + i + 1).to_string(), id.to_string()];
                if let Some((_, values)) = order_column {
                    row.push(values.get(i).cloned().unwrap_or_default());
                }
                row
            })
            .collect();

        let output = match self.mode {
            PrintMode::Table => self.format_table(&columns, &rows),
            PrintMode::Vertical => self.format_vertical(&columns, &rows),
        };
        format!(
            "{}\n{} of {} row(s) ({} ms)\n",
            output,
            rows.len(),
            resp.count,
            execution_time_ms
        )
    }

    /// 打印执行计划及其哈希
    pub fn print_plan(&self, plan: &ExecutionPlan, plan_hash: u64) -> String {
        format!("{}hash: {:016x}\n", plan, plan_hash)
    }

    /// 列出已定义的查询
    pub fn print_queries(&self, defs: &Definitions) -> String {
        let columns: Vec<String> = ["id", "name", "meta_type", "values", "sub_queries", "version"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows: Vec<Vec<String>> = defs.queries().map(|q| query_row(q)).collect();
        if rows.is_empty() {
            return "No queries defined\n".to_string();
        }
        match self.mode {
            PrintMode::Table => self.format_table(&columns, &rows),
            PrintMode::Vertical => self.format_vertical(&columns, &rows),
        }
    }

    /// 表格格式
    fn format_table(&self, columns: &[String], rows: &[Vec<String>]) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);

        let header: Vec<Cell> = columns.iter().map(|c| Cell::new(c)).collect();
        table.set_titles(Row::new(header));

        for row_data in rows {
            let cells: Vec<Cell> = row_data.iter().map(|v| Cell::new(v)).collect();
            table.add_row(Row::new(cells));
        }

        table.to_string()
    }

    /// 垂直格式
    fn format_vertical(&self, columns: &[String], rows: &[Vec<String>]) -> String {
        let max_col_width = columns.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut output = String::new();

        for (i, row_data) in rows.iter().enumerate() {
            output.push_str(&format!(
                "*************************** {}. row ***************************\n",
                i + 1
            ));
            for (j, col) in columns.iter().enumerate() {
                let value = row_data.get(j).map(|s| s.as_str()).unwrap_or("");
                output.push_str(&format!("{:>width$}: {}\n", col, value, width = max_col_width));
            }
        }

        output
    }

    /// 打印导入统计
    pub fn print_stats(&self, stats: &ImportStats) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);
        table.set_titles(row!["Property", "Value"]);
        table.add_row(row!["Paths", stats.paths_imported.to_string()]);
        table.add_row(row!["Queries", stats.queries_imported.to_string()]);
        table.add_row(row!["Entities", stats.entities_imported.to_string()]);
        table.add_row(row!["Skipped", stats.errors.to_string()]);
        table.add_row(row!["Duration (ms)", stats.duration_ms.to_string()]);
        table.to_string()
    }
}

fn query_row(q: &QueryNode) -> Vec<String> {
    let subs = q
        .sub_query_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        q.id.to_string(),
        q.name.clone(),
        q.meta_type_id.clone(),
        q.query_values.len().to_string(),
        subs,
        q.version.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_response_table() {
        let printer = Printer::default();
        let resp = ExecuteResponse {
            results: vec![101, 102],
            count: 5,
        };
        let values = vec!["12.5".to_string(), String::new()];
        let out = printer.print_response(&resp, Some(("price", values.as_slice())), 2, 3);
        assert!(out.contains("101"));
        assert!(out.contains("price"));
        assert!(out.contains("12.5"));
        assert!(out.contains("2 of 5 row(s)"));
    }

    #[test]
    fn test_print_response_vertical_and_empty() {
        let printer = Printer::new(PrintMode::Vertical);
        let resp = ExecuteResponse {
            results: vec![7],
            count: 1,
        };
        let out = printer.print_response(&resp, None, 0, 0);
        assert!(out.contains("1. row"));
        assert!(out.contains("id: 7"));

        let empty = printer.print_response(&ExecuteResponse::default(), None, 0, 1);
        assert!(empty.starts_with("Empty set, 0 total"));
    }

    #[test]
    fn test_print_stats() {
        let stats = ImportStats {
            paths_imported: 2,
            queries_imported: 3,
            ..ImportStats::default()
        };
        let out = Printer::default().print_stats(&stats);
        assert!(out.contains("Queries"));
        assert!(out.contains('3'));
    }
}
