//! Block pruning. `can_prune` is conservative: `true` iff the predicate
//! is guaranteed false for every row in the block.

use crate::predicate::{BinaryOp, CompareOp, Comparison, Expr};

use super::{parse_finite, BlockMeta, ColumnType, Index};

pub fn can_prune(index: &Index, block: &BlockMeta, expr: &Expr) -> bool {
    match expr {
        Expr::Comparison(cmp) => can_prune_comparison(index, block, cmp),
        // NOT never prunes: negation can invert selectivity arbitrarily.
        Expr::Unary { .. } => false,
        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => can_prune(index, block, left) || can_prune(index, block, right),
            BinaryOp::Or => can_prune(index, block, left) && can_prune(index, block, right),
        },
    }
}

fn can_prune_comparison(index: &Index, block: &BlockMeta, cmp: &Comparison) -> bool {
    let Some(column_index) = index
        .columns
        .iter()
        .position(|c| c.name.trim().to_lowercase() == cmp.column)
    else {
        return false;
    };

    let Some(stats) = block.stats.get(column_index) else {
        return false;
    };

    let column_ty = index.columns[column_index].ty;

    if stats.min.is_empty() && stats.max.is_empty() && !cmp.value_text.is_empty() {
        let row_count = block.row_count();
        if u64::from(stats.empty_count) == row_count {
            return matches!(cmp.op, CompareOp::Eq);
        }
    }

    let value_vs_min = compare(&cmp.value_text, &stats.min, cmp.parsed_number, column_ty);
    let value_vs_max = compare(&cmp.value_text, &stats.max, cmp.parsed_number, column_ty);

    match cmp.op {
        CompareOp::Eq => value_vs_min == Some(std::cmp::Ordering::Less) || value_vs_max == Some(std::cmp::Ordering::Greater),
        CompareOp::Ne => stats.min == stats.max && stats.min == cmp.value_text.as_bytes(),
        CompareOp::Gt => value_vs_max.map_or(false, |o| o != std::cmp::Ordering::Less),
        CompareOp::Ge => value_vs_max == Some(std::cmp::Ordering::Greater),
        CompareOp::Lt => value_vs_min.map_or(false, |o| o != std::cmp::Ordering::Greater),
        CompareOp::Le => value_vs_min == Some(std::cmp::Ordering::Less),
    }
}

/// Compares `value_text` against `bound` (a stored min or max) under
/// the column's declared comparison semantics. Returns `None` when a
/// numeric comparison was requested but the bound doesn't parse (the
/// caller treats that as "can't prove anything", matching "stats
/// missing... does not prune").
fn compare(
    value_text: &str,
    bound: &[u8],
    parsed_number: Option<f64>,
    column_ty: ColumnType,
) -> Option<std::cmp::Ordering> {
    if column_ty == ColumnType::Numeric {
        if let Some(value_number) = parsed_number {
            if let Some(bound_number) = parse_finite(bound) {
                return value_number.partial_cmp(&bound_number);
            }
        }
    }

    Some(value_text.as_bytes().cmp(bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{BlockMeta, ColumnEntry, ColumnStats, CURRENT_VERSION};

    fn index_with_block(ty: ColumnType, min: &str, max: &str, empty_count: u32, row_count: u64) -> (Index, BlockMeta) {
        let index = Index {
            version: CURRENT_VERSION,
            block_size: row_count as u32,
            file_size: 0,
            file_mtime_ns: 0,
            columns: vec![ColumnEntry {
                name: "total".into(),
                ty,
            }],
            blocks: vec![],
        };
        let block = BlockMeta {
            start_row: 0,
            end_row: row_count,
            start_offset: 0,
            end_offset: 0,
            stats: vec![ColumnStats {
                min: min.as_bytes().to_vec(),
                max: max.as_bytes().to_vec(),
                empty_count,
            }],
        };
        (index, block)
    }

    #[test]
    fn eq_prunes_outside_numeric_range() {
        let (index, block) = index_with_block(ColumnType::Numeric, "10", "20", 0, 5);
        let expr = Expr::eq("total", "5");
        assert!(can_prune(&index, &block, &expr));

        let expr = Expr::eq("total", "15");
        assert!(!can_prune(&index, &block, &expr));
    }

    #[test]
    fn gt_prunes_when_value_at_or_above_max() {
        let (index, block) = index_with_block(ColumnType::Numeric, "10", "20", 0, 5);
        assert!(can_prune(&index, &block, &Expr::gt("total", "20")));
        assert!(!can_prune(&index, &block, &Expr::gt("total", "19")));
    }

    #[test]
    fn ne_prunes_only_when_block_is_constant_and_equal() {
        let (index, block) = index_with_block(ColumnType::String, "UK", "UK", 0, 5);
        assert!(can_prune(&index, &block, &Expr::ne("total", "UK")));
    }

    #[test]
    fn all_empty_block_prunes_nonempty_equality() {
        let (index, block) = index_with_block(ColumnType::String, "", "", 4, 4);
        assert!(can_prune(&index, &block, &Expr::eq("total", "x")));
        assert!(!can_prune(&index, &block, &Expr::gt("total", "x")));
    }

    #[test]
    fn unknown_column_never_prunes() {
        let (index, block) = index_with_block(ColumnType::Numeric, "10", "20", 0, 5);
        assert!(!can_prune(&index, &block, &Expr::eq("missing", "5")));
    }

    #[test]
    fn not_never_prunes() {
        let (index, block) = index_with_block(ColumnType::Numeric, "10", "20", 0, 5);
        let expr = Expr::eq("total", "5").not();
        assert!(!can_prune(&index, &block, &expr));
    }

    #[test]
    fn and_prunes_if_either_side_prunes() {
        let (index, block) = index_with_block(ColumnType::Numeric, "10", "20", 0, 5);
        let expr = Expr::eq("total", "5").and(Expr::eq("total", "15"));
        assert!(can_prune(&index, &block, &expr));
    }

    #[test]
    fn or_prunes_only_if_both_sides_prune() {
        let (index, block) = index_with_block(ColumnType::Numeric, "10", "20", 0, 5);
        let expr = Expr::eq("total", "5").or(Expr::eq("total", "999"));
        assert!(can_prune(&index, &block, &expr));

        let expr = Expr::eq("total", "5").or(Expr::eq("total", "15"));
        assert!(!can_prune(&index, &block, &expr));
    }
}
