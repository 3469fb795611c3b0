//! Glare evaluation
//!
//! Downsamples the calibrated fisheye image with pfilt and runs evalglare
//! over it, anchored to the measured illuminance. evalglare reports one line
//! of comma-separated names and space-separated values; the six published
//! metrics are pulled out of it by name.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tool_runner::{Tool, ToolError};
use tracing::{debug, info};

/// Glare evaluation error types
#[derive(Error, Debug)]
pub enum GlareError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Unparseable evalglare output {output:?}: {reason}")]
    Parse { output: String, reason: String },
}

/// Side length evalglare runs at; the full merge is too large for it
const EVAL_EXTENT: u32 = 800;

/// Discomfort-glare indices published per cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GlareMetrics {
    pub dgp: f64,
    pub dgi: f64,
    pub ugr: f64,
    pub vcp: f64,
    pub cgi: f64,
    #[serde(rename = "Lveil")]
    pub lveil: f64,
}

/// Downsample `image` into `work_dir` and evaluate glare at the measured
/// illuminance
pub async fn evaluate(
    image: &Path,
    measured_lux: f64,
    work_dir: &Path,
) -> Result<GlareMetrics, GlareError> {
    info!("Running evalglare");

    let filtered = work_dir.join("glare_input.hdr");
    Tool::new("pfilt")
        .args(["-1", "-e", "1"])
        .arg("-x")
        .arg(EVAL_EXTENT.to_string())
        .arg("-y")
        .arg(EVAL_EXTENT.to_string())
        .arg(image.to_string_lossy())
        .output_to_file(&filtered)
        .await?;

    let output = Tool::new("evalglare")
        .args(["-vta", "-vv", "180", "-vh", "180"])
        .arg("-i")
        .arg(format!("{measured_lux:.2}"))
        .arg(filtered.to_string_lossy())
        .output_text()
        .await?;

    parse_evalglare(&output)
}

/// Parse evalglare's `name,name,…: v v …` summary line
pub fn parse_evalglare(output: &str) -> Result<GlareMetrics, GlareError> {
    let line = output.trim();
    let parse_err = |reason: &str| GlareError::Parse {
        output: line.to_string(),
        reason: reason.to_string(),
    };

    let (names_part, rest) = line
        .split_once(':')
        .ok_or_else(|| parse_err("missing ':' separator"))?;
    let values_part = rest.rsplit(':').next().unwrap_or(rest);

    let names = names_part.split(',').map(str::trim);
    let mut values = Vec::new();
    for value in values_part.split_whitespace() {
        values.push(
            value
                .parse::<f64>()
                .map_err(|_| parse_err(&format!("non-numeric value {value:?}")))?,
        );
    }

    let fields: BTreeMap<&str, f64> = names.zip(values).collect();

    let metric = |name: &str| {
        fields
            .get(name)
            .copied()
            .ok_or_else(|| parse_err(&format!("missing metric {name:?}")))
    };

    let metrics = GlareMetrics {
        dgp: metric("dgp")?,
        dgi: metric("dgi")?,
        ugr: metric("ugr")?,
        vcp: metric("vcp")?,
        cgi: metric("cgi")?,
        lveil: metric("Lveil")?,
    };

    for (name, value) in &fields {
        if !matches!(*name, "dgp" | "dgi" | "ugr" | "vcp" | "cgi" | "Lveil") {
            debug!("evalglare extra field {} = {}", name, value);
        }
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_LINE: &str = "dgp,av_lum,E_v,lum_backg,E_v_dir,dgi,ugr,vcp,cgi,lum_sources,omega_sources,Lveil: 0.283 102.5 2440.1 95.2 1200.0 18.2 15.4 82.1 17.9 3051.2 0.012 4.2";

    #[test]
    fn test_parse_full_output_line() {
        let metrics = parse_evalglare(FULL_LINE).unwrap();
        assert!((metrics.dgp - 0.283).abs() < 1e-9);
        assert!((metrics.dgi - 18.2).abs() < 1e-9);
        assert!((metrics.ugr - 15.4).abs() < 1e-9);
        assert!((metrics.vcp - 82.1).abs() < 1e-9);
        assert!((metrics.cgi - 17.9).abs() < 1e-9);
        assert!((metrics.lveil - 4.2).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        let metrics = parse_evalglare(&format!("{FULL_LINE}\n")).unwrap();
        assert!((metrics.dgp - 0.283).abs() < 1e-9);
    }

    #[test]
    fn test_missing_separator_is_error() {
        let err = parse_evalglare("no separator here").unwrap_err();
        assert!(matches!(err, GlareError::Parse { .. }));
    }

    #[test]
    fn test_missing_metric_is_error() {
        let err = parse_evalglare("dgp,dgi: 0.2 14.0").unwrap_err();
        match err {
            GlareError::Parse { reason, .. } => assert!(reason.contains("ugr")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_value_is_error() {
        let err = parse_evalglare("dgp,dgi: 0.2 nan?").unwrap_err();
        match err {
            GlareError::Parse { reason, .. } => assert!(reason.contains("nan?")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_evaluate_without_image_is_tool_error() {
        let err = evaluate(
            Path::new("/nonexistent/cali.hdr"),
            512.0,
            &std::env::temp_dir(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GlareError::Tool(_)));
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(GlareMetrics::default()).unwrap();
        let object = value.as_object().unwrap();
        for key in ["dgp", "dgi", "ugr", "vcp", "cgi", "Lveil"] {
            assert!(object.contains_key(key), "missing {key}");
        }
    }
}
