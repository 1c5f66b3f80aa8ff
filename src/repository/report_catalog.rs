use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    /// Nulls count as zero; an empty bucket sums to zero.
    Sum,
    /// Rounded to two decimals; an empty bucket averages to null.
    Avg,
}

impl AggregateFn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
        }
    }
}

/// JSON type a field is emitted as. Several dashboards expect numbers as
/// two-decimal strings, so the type is fixed per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    Number,
    NumericString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricSpec {
    pub column: &'static str,
    pub alias: &'static str,
    pub function: AggregateFn,
    pub format: ValueFormat,
}

/// `numerator / denominator`, both referring to metric aliases of the same report.
/// Always emits `<alias>_percent`; emits `<alias>` itself only when
/// `emit_ratio` is set (otherwise `<alias>` is usually the numerator metric).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RatioSpec {
    pub alias: &'static str,
    pub numerator: &'static str,
    pub denominator: &'static str,
    pub emit_ratio: bool,
    pub format: ValueFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub table: &'static str,
    pub date_column: &'static str,
    pub organisation_column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportDefinition {
    pub slug: &'static str,
    pub source: SourceRef,
    pub metrics: &'static [MetricSpec],
    pub ratios: &'static [RatioSpec],
}

impl ReportDefinition {
    pub fn to_json(&self) -> Value {
        json!({
            "slug": self.slug,
            "metrics": self
                .metrics
                .iter()
                .map(|metric| json!({
                    "alias": metric.alias,
                    "aggregate": metric.function.as_str(),
                }))
                .collect::<Vec<_>>(),
            "ratios": self
                .ratios
                .iter()
                .map(|ratio| ratio.alias)
                .collect::<Vec<_>>(),
        })
    }
}

/// Every table and column the reporting endpoints may touch.
pub const REPORTS: &[ReportDefinition] = &[
    ReportDefinition {
        slug: "production",
        source: SourceRef {
            table: "production_entries",
            date_column: "entry_date",
            organisation_column: "organisation_id",
        },
        metrics: &[
            MetricSpec {
                column: "production_kg",
                alias: "production",
                function: AggregateFn::Sum,
                format: ValueFormat::Number,
            },
            MetricSpec {
                column: "target_kg",
                alias: "target",
                function: AggregateFn::Sum,
                format: ValueFormat::Number,
            },
            MetricSpec {
                column: "efficiency",
                alias: "avg_efficiency",
                function: AggregateFn::Avg,
                format: ValueFormat::Number,
            },
        ],
        ratios: &[RatioSpec {
            alias: "achievement",
            numerator: "production",
            denominator: "target",
            emit_ratio: true,
            format: ValueFormat::Number,
        }],
    },
    ReportDefinition {
        slug: "yarn-realisation",
        source: SourceRef {
            table: "yarn_realisation_entries",
            date_column: "entry_date",
            organisation_column: "organisation_id",
        },
        metrics: &[
            MetricSpec {
                column: "cotton_issued_kg",
                alias: "cotton_issued",
                function: AggregateFn::Sum,
                format: ValueFormat::NumericString,
            },
            MetricSpec {
                column: "yarn_produced_kg",
                alias: "yarn_produced",
                function: AggregateFn::Sum,
                format: ValueFormat::NumericString,
            },
            MetricSpec {
                column: "waste_kg",
                alias: "waste",
                function: AggregateFn::Sum,
                format: ValueFormat::NumericString,
            },
        ],
        ratios: &[
            RatioSpec {
                alias: "realisation",
                numerator: "yarn_produced",
                denominator: "cotton_issued",
                emit_ratio: true,
                format: ValueFormat::NumericString,
            },
            RatioSpec {
                alias: "waste",
                numerator: "waste",
                denominator: "cotton_issued",
                emit_ratio: false,
                format: ValueFormat::NumericString,
            },
        ],
    },
    ReportDefinition {
        slug: "spindle-utilisation",
        source: SourceRef {
            table: "spindle_utilisation_entries",
            date_column: "entry_date",
            organisation_column: "organisation_id",
        },
        metrics: &[
            MetricSpec {
                column: "spindles_worked",
                alias: "spindles_worked",
                function: AggregateFn::Sum,
                format: ValueFormat::Number,
            },
            MetricSpec {
                column: "spindles_installed",
                alias: "spindles_installed",
                function: AggregateFn::Sum,
                format: ValueFormat::Number,
            },
        ],
        ratios: &[RatioSpec {
            alias: "utilisation",
            numerator: "spindles_worked",
            denominator: "spindles_installed",
            emit_ratio: true,
            format: ValueFormat::Number,
        }],
    },
    ReportDefinition {
        slug: "power-consumption",
        source: SourceRef {
            table: "power_consumption_entries",
            date_column: "entry_date",
            organisation_column: "organisation_id",
        },
        metrics: &[
            MetricSpec {
                column: "units_consumed",
                alias: "units_consumed",
                function: AggregateFn::Sum,
                format: ValueFormat::Number,
            },
            MetricSpec {
                column: "ukg",
                alias: "avg_ukg",
                function: AggregateFn::Avg,
                format: ValueFormat::Number,
            },
        ],
        ratios: &[],
    },
];

pub fn find_report(slug: &str) -> Option<&'static ReportDefinition> {
    let slug = slug.trim();
    REPORTS.iter().find(|report| report.slug == slug)
}
