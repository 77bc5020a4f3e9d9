//! Quantified invariants a nesting result must satisfy, independent of
//! the algorithm that produced it. Grounded in the teacher's
//! `validate.rs` shape (a standalone checker returning a list of
//! violations) but checking polygon placements rather than AABBs.

use crate::nester::{NestConfig, NestingResult, PartInput};

#[derive(Debug, Clone, PartialEq)]
pub struct Violation(pub String);

/// Runs every invariant from the testable-properties list against one
/// nesting outcome. Returns an empty vec iff the result is sound.
pub fn check_result(parts: &[PartInput], result: &NestingResult, config: &NestConfig) -> Vec<Violation> {
    let mut violations = Vec::new();

    check_conservation(parts, result, &mut violations);
    check_boundedness(result, config, &mut violations);
    check_non_overlap(result, config, &mut violations);
    check_rotation_admissibility(result, config, &mut violations);
    check_no_empty_sheets(result, &mut violations);
    check_utilization_domain(result, &mut violations);

    violations
}

fn check_conservation(parts: &[PartInput], result: &NestingResult, violations: &mut Vec<Violation>) {
    let total_input: u32 = parts.iter().map(|p| p.quantity).sum();
    let placed: usize = result.sheets.iter().map(|s| s.placements.len()).sum();
    let accounted = placed + result.skipped.len();
    if accounted as u32 != total_input {
        violations.push(Violation(format!(
            "conservation violated: {total_input} input instances but {accounted} placed+skipped"
        )));
    }
}

fn check_boundedness(result: &NestingResult, config: &NestConfig, violations: &mut Vec<Violation>) {
    for sheet in &result.sheets {
        for placement in &sheet.placements {
            let Some(bounds) = placement.polygon.bounds() else {
                violations.push(Violation(format!(
                    "placement {}#{} has no bounding box",
                    placement.part_id, placement.instance
                )));
                continue;
            };
            let lo_x = config.margin - 1e-6;
            let lo_y = config.margin - 1e-6;
            let hi_x = config.sheet_width - config.margin + 1e-6;
            let hi_y = config.sheet_height - config.margin + 1e-6;
            if bounds.min_x < lo_x
                || bounds.min_y < lo_y
                || bounds.max_x > hi_x
                || bounds.max_y > hi_y
            {
                violations.push(Violation(format!(
                    "placement {}#{} bounding box escapes usable area",
                    placement.part_id, placement.instance
                )));
            }
        }
    }
}

fn check_non_overlap(result: &NestingResult, config: &NestConfig, violations: &mut Vec<Violation>) {
    for sheet in &result.sheets {
        let buffered: Vec<_> = sheet
            .placements
            .iter()
            .filter_map(|p| p.polygon.buffered(config.spacing / 2.0))
            .collect();
        for i in 0..buffered.len() {
            for j in (i + 1)..buffered.len() {
                if buffered[i].non_trivially_intersects(&buffered[j]) {
                    violations.push(Violation(format!(
                        "sheet {} placements {} and {} have overlapping buffered polygons",
                        sheet.index, i, j
                    )));
                }
            }
        }
    }
}

fn check_rotation_admissibility(
    result: &NestingResult,
    config: &NestConfig,
    violations: &mut Vec<Violation>,
) {
    for sheet in &result.sheets {
        for placement in &sheet.placements {
            let admissible = if config.rotation_step <= 0.0 {
                placement.rotation == 0.0
            } else {
                let k = placement.rotation / config.rotation_step;
                (k - k.round()).abs() < 1e-6 && placement.rotation >= 0.0 && placement.rotation < 360.0
            };
            if !admissible {
                violations.push(Violation(format!(
                    "placement {}#{} has inadmissible rotation {}",
                    placement.part_id, placement.instance, placement.rotation
                )));
            }
        }
    }
}

fn check_no_empty_sheets(result: &NestingResult, violations: &mut Vec<Violation>) {
    for sheet in &result.sheets {
        if sheet.placements.is_empty() {
            violations.push(Violation(format!("sheet {} has no placements", sheet.index)));
        }
    }
}

fn check_utilization_domain(result: &NestingResult, violations: &mut Vec<Violation>) {
    for sheet in &result.sheets {
        if !(sheet.utilization > 0.0 && sheet.utilization <= 1.0 + 1e-9) {
            violations.push(Violation(format!(
                "sheet {} utilization {} out of (0, 1]",
                sheet.index, sheet.utilization
            )));
        }
    }
    if !result.sheets.is_empty() {
        let mean: f64 =
            result.sheets.iter().map(|s| s.utilization).sum::<f64>() / result.sheets.len() as f64;
        if (mean - result.avg_utilization).abs() > 1e-9 {
            violations.push(Violation(format!(
                "avg_utilization {} does not match arithmetic mean {}",
                result.avg_utilization, mean
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nester::nest_instances;
    use nest_core::{Point2D, Polygon};

    fn square(side: f64) -> Polygon {
        Polygon::from_points(&[
            Point2D::new(0.0, 0.0),
            Point2D::new(side, 0.0),
            Point2D::new(side, side),
            Point2D::new(0.0, side),
        ])
        .unwrap()
    }

    #[test]
    fn sound_result_has_no_violations() {
        let parts = vec![
            PartInput { id: "A".into(), polygon: square(3.0), quantity: 2 },
            PartInput { id: "B".into(), polygon: square(1.0), quantity: 4 },
        ];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 90.0,
        };
        let result = nest_instances(&parts, &config);
        let violations = check_result(&parts, &result, &config);
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn conservation_counts_skipped_and_placed() {
        let parts = vec![PartInput { id: "A".into(), polygon: square(20.0), quantity: 3 }];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 5.0,
        };
        let result = nest_instances(&parts, &config);
        let violations = check_result(&parts, &result, &config);
        assert!(violations.is_empty());
        assert_eq!(result.skipped.len(), 3);
    }
}
