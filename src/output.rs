use std::io::{self, Write};

use serde::Serialize;

use crate::report::VolcanoPoint;
use crate::store::Metadata;
use crate::top_table::TopTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub series: String,
    pub platform: String,
    pub samples: usize,
    pub features_before: usize,
    pub features_after: usize,
    pub log_transformed: bool,
    pub formula: String,
    pub coefficient: String,
    pub coefficient_names: Vec<String>,
    pub df_prior: f64,
    pub s2_prior: f64,
    pub significant: usize,
    pub top_table: TopTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volcano: Option<Vec<VolcanoPoint>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerReport {
    pub model: String,
    pub question: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListReport {
    pub cache_root: String,
    pub entries: Vec<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheClearReport {
    pub cache_root: String,
    pub cleared: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_analysis(report: &AnalysisReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_answer(report: &AnswerReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_cache_list(report: &CacheListReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_cache_clear(report: &CacheClearReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_analysis(report: &AnalysisReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_analysis(&mut stdout, report)
    }

    pub fn write_analysis<W: Write>(out: &mut W, report: &AnalysisReport) -> io::Result<()> {
        writeln!(
            out,
            "{} on {}: {} samples, {} -> {} features",
            report.series,
            report.platform,
            report.samples,
            report.features_before,
            report.features_after
        )?;
        writeln!(
            out,
            "design {} [{}], coefficient {}",
            report.formula,
            report.coefficient_names.join(", "),
            report.coefficient
        )?;
        writeln!(
            out,
            "prior df {:.3}, prior variance {:.5}, {} rows with adj.P.Val < 0.05",
            report.df_prior, report.s2_prior, report.significant
        )?;
        writeln!(out, "probe_id\tgene_name\tlogFC\tAveExpr\tt\tP.Value\tadj.P.Val")?;
        for row in &report.top_table.rows {
            writeln!(
                out,
                "{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6e}\t{:.6e}",
                row.probe_id,
                row.gene_name,
                row.log_fc,
                row.ave_expr,
                row.t,
                row.p_value,
                row.adj_p_value
            )?;
        }
        if let Some(points) = &report.volcano {
            let significant = points.iter().filter(|point| point.significant).count();
            writeln!(
                out,
                "volcano: {} points, {} significant",
                points.len(),
                significant
            )?;
        }
        Ok(())
    }

    pub fn print_cache_list(report: &CacheListReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if report.entries.is_empty() {
            writeln!(stdout, "cache at {} is empty", report.cache_root)?;
        }
        for entry in &report.entries {
            writeln!(
                stdout,
                "{}\t{}\t{} bytes\t{}",
                entry.accession, entry.downloaded_at, entry.size_bytes, entry.resolved_path
            )?;
        }
        Ok(())
    }
}
