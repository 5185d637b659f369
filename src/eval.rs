//! WHERE clause evaluation over a parsed row.

use crate::header::Header;
use crate::index::parse_finite;
use crate::predicate::{BinaryOp, CompareOp, Comparison, Expr};

/// Evaluates `expr` against `record`, whose fields are addressed by
/// ordinal through `header`. Short-circuits AND/OR; unparseable
/// numeric comparisons default to `false`, except `!=`, which defaults
/// to `true` (an unparseable value is, definitionally, not equal).
pub fn eval(expr: &Expr, header: &Header, record: &[impl AsRef<[u8]>]) -> bool {
    match expr {
        Expr::Comparison(cmp) => eval_comparison(cmp, header, record),
        Expr::Unary { child } => !eval(child, header, record),
        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => eval(left, header, record) && eval(right, header, record),
            BinaryOp::Or => eval(left, header, record) || eval(right, header, record),
        },
    }
}

fn eval_comparison(cmp: &Comparison, header: &Header, record: &[impl AsRef<[u8]>]) -> bool {
    let Ok(ordinal) = header.resolve(&cmp.column) else {
        return false;
    };
    let Some(field) = record.get(ordinal) else {
        return false;
    };
    let field = field.as_ref();

    // Numeric comparison applies only when both sides parse as finite
    // doubles; otherwise we fall back to lexicographic byte comparison.
    if let Some(value_number) = cmp.parsed_number {
        if let Some(field_number) = parse_finite(field) {
            return compare_numbers(field_number, value_number, cmp.op);
        }
        return cmp.op == CompareOp::Ne;
    }

    compare_bytes(field, cmp.value_text.as_bytes(), cmp.op)
}

fn compare_numbers(field: f64, value: f64, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => field == value,
        CompareOp::Ne => field != value,
        CompareOp::Gt => field > value,
        CompareOp::Ge => field >= value,
        CompareOp::Lt => field < value,
        CompareOp::Le => field <= value,
    }
}

fn compare_bytes(field: &[u8], value: &[u8], op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => field == value,
        CompareOp::Ne => field != value,
        CompareOp::Gt => field > value,
        CompareOp::Ge => field >= value,
        CompareOp::Lt => field < value,
        CompareOp::Le => field <= value,
    }
}
