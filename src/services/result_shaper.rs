use serde_json::{Map, Value};

use crate::{
    repository::report_catalog::{MetricSpec, RatioSpec, ValueFormat},
    services::buckets::{format_label, label_period_start, BucketGranularity},
};

pub struct ShapeContext<'a> {
    pub granularity: BucketGranularity,
    pub metrics: &'a [MetricSpec],
    pub ratios: &'a [RatioSpec],
}

/// Turns raw aggregate rows into chart rows: `label`, one field per metric and
/// the ratio fields. Missing or non-numeric values become zero, ratios with a
/// non-positive denominator become zero, and rows come back oldest bucket first.
/// Labels are read according to the granularity and re-rendered canonically.
pub fn shape_rows(rows: Vec<Value>, context: &ShapeContext<'_>) -> Vec<Map<String, Value>> {
    let mut shaped = rows
        .iter()
        .map(|row| {
            let raw_label = value_str(row, "label");
            let start = label_period_start(context.granularity, &raw_label);
            let label = start
                .map(|date| format_label(context.granularity, date))
                .unwrap_or(raw_label);
            (start, shape_row(label, row, context))
        })
        .collect::<Vec<_>>();

    // Labels that cannot be read back keep their database order at the end.
    shaped.sort_by_key(|(start, _)| (start.is_none(), *start));
    shaped.into_iter().map(|(_, row)| row).collect()
}

fn shape_row(label: String, row: &Value, context: &ShapeContext<'_>) -> Map<String, Value> {
    let mut shaped = Map::new();
    shaped.insert("label".to_string(), Value::String(label));

    for metric in context.metrics {
        let amount = number_from_value(row.get(metric.alias));
        shaped.insert(metric.alias.to_string(), format_value(amount, metric.format, 2));
    }

    for ratio in context.ratios {
        let numerator = number_from_value(row.get(ratio.numerator));
        let denominator = number_from_value(row.get(ratio.denominator));
        let value = safe_ratio(numerator, denominator);
        if ratio.emit_ratio {
            shaped.insert(ratio.alias.to_string(), format_value(value, ratio.format, 4));
        }
        shaped.insert(
            format!("{}_percent", ratio.alias),
            Value::String(percent_string(numerator, denominator)),
        );
    }

    shaped
}

/// `numerator / denominator`, or zero unless the denominator is positive.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && numerator.is_finite() && denominator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

/// Percentage with exactly two decimals; `"0.00"` when the denominator is not positive.
pub fn percent_string(numerator: f64, denominator: f64) -> String {
    fixed2(safe_ratio(numerator, denominator) * 100.0)
}

pub fn fixed2(value: f64) -> String {
    let rounded = round2(value);
    // Avoid rendering "-0.00".
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.2}")
}

fn format_value(value: f64, format: ValueFormat, number_places: i32) -> Value {
    match format {
        ValueFormat::NumericString => Value::String(fixed2(value)),
        ValueFormat::Number => {
            let factor = 10_f64.powi(number_places);
            serde_json::Number::from_f64((value * factor).round() / factor)
                .map(Value::Number)
                .unwrap_or_else(|| Value::from(0))
        }
    }
}

/// Numeric coercion for driver values: numbers pass through, numeric text is
/// parsed, anything else (null, missing, garbage, non-finite) is zero.
pub fn number_from_value(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{fixed2, number_from_value, percent_string, shape_rows, ShapeContext};
    use crate::{
        repository::report_catalog::find_report,
        services::buckets::BucketGranularity,
    };

    #[test]
    fn percent_is_zero_string_without_denominator() {
        assert_eq!(percent_string(50.0, 0.0), "0.00");
        assert_eq!(percent_string(0.0, 0.0), "0.00");
        assert_eq!(percent_string(5.0, -3.0), "0.00");
    }

    #[test]
    fn percent_rounds_to_two_decimals() {
        assert_eq!(percent_string(1.0, 3.0), "33.33");
        assert_eq!(percent_string(2.0, 3.0), "66.67");
        assert_eq!(percent_string(850.0, 1000.0), "85.00");
        assert_eq!(percent_string(3.0, 2.0), "150.00");
    }

    #[test]
    fn coerces_text_and_nulls() {
        assert_eq!(number_from_value(Some(&json!("12.5"))), 12.5);
        assert_eq!(number_from_value(Some(&json!(" 7 "))), 7.0);
        assert_eq!(number_from_value(Some(&json!(3))), 3.0);
        assert_eq!(number_from_value(Some(&Value::Null)), 0.0);
        assert_eq!(number_from_value(Some(&json!("n/a"))), 0.0);
        assert_eq!(number_from_value(Some(&json!("NaN"))), 0.0);
        assert_eq!(number_from_value(None), 0.0);
        assert_eq!(fixed2(-0.001), "0.00");
    }

    #[test]
    fn shapes_numeric_string_reports() {
        let report = find_report("yarn-realisation").expect("catalog entry");
        let rows = vec![json!({
            "label": "Mar 2025",
            "cotton_issued": "1000",
            "yarn_produced": 853.456,
            "waste": null,
            "bucket_start": "2025-03-01"
        })];
        let shaped = shape_rows(
            rows,
            &ShapeContext {
                granularity: BucketGranularity::Monthly,
                metrics: report.metrics,
                ratios: report.ratios,
            },
        );

        assert_eq!(shaped.len(), 1);
        let row = &shaped[0];
        assert_eq!(row.get("label"), Some(&json!("Mar 2025")));
        assert_eq!(row.get("cotton_issued"), Some(&json!("1000.00")));
        assert_eq!(row.get("yarn_produced"), Some(&json!("853.46")));
        assert_eq!(row.get("waste"), Some(&json!("0.00")));
        assert_eq!(row.get("realisation"), Some(&json!("0.85")));
        assert_eq!(row.get("realisation_percent"), Some(&json!("85.35")));
        assert_eq!(row.get("waste_percent"), Some(&json!("0.00")));
        assert!(row.get("bucket_start").is_none());
    }

    #[test]
    fn shapes_number_reports_and_zero_denominators() {
        let report = find_report("spindle-utilisation").expect("catalog entry");
        let rows = vec![json!({
            "label": "Week 1-Apr 2025",
            "spindles_worked": 0,
            "spindles_installed": 0
        })];
        let shaped = shape_rows(
            rows,
            &ShapeContext {
                granularity: BucketGranularity::WeeklyInMonth,
                metrics: report.metrics,
                ratios: report.ratios,
            },
        );

        let row = &shaped[0];
        assert_eq!(row.get("spindles_worked").and_then(Value::as_f64), Some(0.0));
        assert_eq!(row.get("utilisation").and_then(Value::as_f64), Some(0.0));
        assert_eq!(row.get("utilisation_percent"), Some(&json!("0.00")));
    }

    #[test]
    fn missing_averages_become_zero() {
        let report = find_report("power-consumption").expect("catalog entry");
        let shaped = shape_rows(
            vec![json!({ "label": "2025-01-02", "units_consumed": 120.5 })],
            &ShapeContext {
                granularity: BucketGranularity::Daily,
                metrics: report.metrics,
                ratios: report.ratios,
            },
        );
        assert_eq!(shaped[0].get("avg_ukg").and_then(Value::as_f64), Some(0.0));
        assert_eq!(
            shaped[0].get("units_consumed").and_then(Value::as_f64),
            Some(120.5)
        );
    }

    #[test]
    fn orders_rows_chronologically_by_label() {
        let report = find_report("power-consumption").expect("catalog entry");
        let rows = vec![
            json!({ "label": "Week 2-Mar 2025" }),
            json!({ "label": "not a label" }),
            json!({ "label": "Week 1-Apr 2025" }),
            json!({ "label": "Week 1-Mar 2025" }),
        ];
        let shaped = shape_rows(
            rows,
            &ShapeContext {
                granularity: BucketGranularity::WeeklyInMonth,
                metrics: report.metrics,
                ratios: report.ratios,
            },
        );
        let labels = shaped
            .iter()
            .filter_map(|row| row.get("label").and_then(Value::as_str))
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec!["Week 1-Mar 2025", "Week 2-Mar 2025", "Week 1-Apr 2025", "not a label"]
        );
    }

    #[test]
    fn normalises_padded_labels() {
        let report = find_report("power-consumption").expect("catalog entry");
        let shaped = shape_rows(
            vec![json!({ "label": "  Jan 2025 " })],
            &ShapeContext {
                granularity: BucketGranularity::Monthly,
                metrics: report.metrics,
                ratios: report.ratios,
            },
        );
        assert_eq!(shaped[0].get("label"), Some(&json!("Jan 2025")));
    }
}
