//! Text formatting for the results table and the bias-study summary.
//!
//! Formatting lives here so the selection code only produces data and output
//! changes stay localized.

use crate::domain::{PerCategoryChoice, ResultRow};
use crate::selection::CategoryResult;

/// LaTeX header of the results table.
pub const RESULTS_HEADER: &str =
    "Truth Model & d.o.f & $\\Delta NLL_{N+1}$ & $p(\\chi^{2}>\\chi^{2}_{(N\\rightarrow N+1)})$ \\\\";

/// One table row: `family & dof & chi2 & prob \\`.
pub fn format_result_row(row: &ResultRow) -> String {
    format!(
        "{:>15} & {} & {:5.2} & {:5.2} \\\\",
        row.family.display_name(),
        row.dof,
        row.chi2,
        row.prob
    )
}

/// Full results table: header, then each category's rows closed by `\hline`.
pub fn format_results_table<'a>(categories: impl IntoIterator<Item = &'a [ResultRow]>) -> String {
    let mut out = String::new();
    out.push_str(RESULTS_HEADER);
    out.push('\n');
    out.push_str("\\hline\n");
    for rows in categories {
        for row in rows {
            out.push_str(&format_result_row(row));
            out.push('\n');
        }
        out.push_str("\\hline\n");
    }
    out
}

/// `key = value` summary consumed by bias studies.
pub fn format_bias_summary(results: &[CategoryResult]) -> String {
    let mut out = String::new();
    for r in results {
        out.push_str(&format!("cat = [{}, {}]\n", r.category, r.index));
        out.push_str(&format_choice(&r.choice));
        out.push('\n');
    }
    out
}

fn format_choice(choice: &PerCategoryChoice) -> String {
    let mut out = String::new();
    for (family, order) in &choice.truth {
        out.push_str(&format!(
            "truth = {}:{order}:{}{order}\n",
            family.display_name(),
            family.summary_tag()
        ));
    }
    for (family, orders) in &choice.envelope {
        for order in orders {
            out.push_str(&format!(
                "paul = {}:{order}:{}{order}\n",
                family.display_name(),
                family.summary_tag()
            ));
        }
    }
    out
}

/// Console block listing each category's truth orders.
pub fn format_recommended(results: &[CategoryResult]) -> String {
    let mut out = String::from("[RESULT] Recommended options\n");
    for r in results {
        out.push_str(&format!("Cat [{}, {}]\n", r.category, r.index));
        for (family, order) in &r.choice.truth {
            out.push_str(&format!("\t{} - {order}\n", family.display_name()));
        }
        out.push_str(&format!(
            "\tbest index {} ({}), simple index {}\n",
            r.best.index,
            r.multipdf.active().name(),
            r.simple_index
        ));
    }
    out
}
