use std::rc::Rc;

use nest_core::{Point2D, Polygon};
use serde::{Deserialize, Serialize};

/// One part type submitted to the nester: its outline and how many
/// copies are wanted. Quantity 0 is legal and simply contributes
/// nothing to the result.
#[derive(Debug, Clone)]
pub struct PartInput {
    pub id: String,
    pub polygon: Polygon,
    pub quantity: u32,
}

/// Packing parameters for one nesting invocation.
#[derive(Debug, Clone, Copy)]
pub struct NestConfig {
    pub sheet_width: f64,
    pub sheet_height: f64,
    pub spacing: f64,
    pub margin: f64,
    pub rotation_step: f64,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            sheet_width: 48.0,
            sheet_height: 96.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 5.0,
        }
    }
}

/// A successfully placed part instance on a sheet.
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub part_id: String,
    pub instance: u32,
    /// Degrees, CCW, a member of the admitted rotation set.
    pub rotation: f64,
    #[serde(skip)]
    pub polygon: Polygon,
    pub x: f64,
    pub y: f64,
}

/// A part instance the nester could not place, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedInstance {
    pub part_id: String,
    pub instance: u32,
    pub reason: String,
}

/// One physical stock sheet and everything placed on it.
#[derive(Debug, Clone)]
pub struct SheetResult {
    pub index: usize,
    pub width: f64,
    pub height: f64,
    pub placements: Vec<Placement>,
    pub utilization: f64,
}

/// The full outcome of one nesting invocation.
#[derive(Debug, Clone)]
pub struct NestingResult {
    pub sheets: Vec<SheetResult>,
    pub skipped: Vec<SkippedInstance>,
    pub total_sheets: usize,
    pub total_parts_placed: usize,
    pub avg_utilization: f64,
}

impl NestingResult {
    fn empty() -> Self {
        Self {
            sheets: Vec::new(),
            skipped: Vec::new(),
            total_sheets: 0,
            total_parts_placed: 0,
            avg_utilization: 0.0,
        }
    }
}

struct Instance {
    part_id: String,
    instance: u32,
    original: Polygon,
    buffered: Rc<Polygon>,
}

struct Sheet {
    placements: Vec<Placement>,
    placed_buffered: Vec<Polygon>,
}

struct Candidate {
    rotation: f64,
    x: f64,
    y: f64,
    normalized_original: Polygon,
    normalized_buffered: Polygon,
}

/// Rotations tried, in ascending order: `{0, step, 2*step, ...}` within
/// `[0, 360)`. `rotation_step <= 0` disables rotation, trying only 0 —
/// this also covers `rotation_step == 360` ("one rotation, just 0"),
/// since `0..360` stepping by `360` never reaches a second value.
fn admitted_rotations(step: f64) -> Vec<f64> {
    if step <= 0.0 {
        return vec![0.0];
    }
    let mut rotations = Vec::new();
    let mut k = 0.0;
    while k < 360.0 - 1e-9 {
        rotations.push(k);
        k += step;
    }
    rotations
}

/// Scan every admitted rotation for the lexicographically smallest
/// `(y, x)` position that fits the usable area and does not
/// non-trivially intersect anything already placed on `placed_buffered`.
/// Ties across rotations favor the smaller rotation, since later
/// rotations only replace the running best on a strict improvement.
fn best_candidate(
    original: &Polygon,
    buffered: &Polygon,
    rotations: &[f64],
    usable_width: f64,
    usable_height: f64,
    margin: f64,
    placed_buffered: &[Polygon],
) -> Option<Candidate> {
    let centroid = original.centroid()?;
    let mut best: Option<Candidate> = None;

    for &rotation in rotations {
        let rotated_original = original.rotated_about(rotation, centroid);
        let rotated_buffered = buffered.rotated_about(rotation, centroid);
        let bbox = match rotated_buffered.bounds() {
            Some(b) => b,
            None => continue,
        };

        let dx = -bbox.min_x;
        let dy = -bbox.min_y;
        let norm_buffered = rotated_buffered.translated(dx, dy);
        let norm_original = rotated_original.translated(dx, dy);
        let pw = bbox.width();
        let ph = bbox.height();
        if pw > usable_width + 1e-9 || ph > usable_height + 1e-9 {
            continue;
        }

        let step = (pw.min(ph) / 4.0).max(0.25);
        let mut found: Option<(f64, f64)> = None;
        let mut y = 0.0;
        'outer: while y + ph <= usable_height + 1e-9 {
            let mut x = 0.0;
            while x + pw <= usable_width + 1e-9 {
                let placed_here = norm_buffered.translated(x + margin, y + margin);
                let collides = placed_buffered
                    .iter()
                    .any(|p| p.non_trivially_intersects(&placed_here));
                if !collides {
                    found = Some((x, y));
                    break 'outer;
                }
                x += step;
            }
            y += step;
        }

        if let Some((x, y)) = found {
            let better = match &best {
                None => true,
                Some(b) => (y, x) < (b.y, b.x),
            };
            if better {
                best = Some(Candidate {
                    rotation,
                    x,
                    y,
                    normalized_original: norm_original,
                    normalized_buffered: norm_buffered,
                });
            }
        }
    }

    best
}

fn fits_usable_area_at_any_rotation(
    original: &Polygon,
    buffered: &Polygon,
    rotations: &[f64],
    usable_width: f64,
    usable_height: f64,
) -> bool {
    let Some(centroid) = original.centroid() else {
        return false;
    };
    rotations.iter().any(|&rotation| {
        let rotated = buffered.rotated_about(rotation, centroid);
        match rotated.bounds() {
            Some(b) => b.width() <= usable_width + 1e-9 && b.height() <= usable_height + 1e-9,
            None => false,
        }
    })
}

/// Pack `parts` onto sheets of `config.sheet_width` x
/// `config.sheet_height`. Never fails on packing outcomes: every input
/// instance ends up placed on exactly one sheet or recorded in
/// `skipped`.
pub fn nest_instances(parts: &[PartInput], config: &NestConfig) -> NestingResult {
    let usable_width = config.sheet_width - 2.0 * config.margin;
    let usable_height = config.sheet_height - 2.0 * config.margin;
    if usable_width <= 0.0 || usable_height <= 0.0 {
        return NestingResult::empty();
    }

    let rotations = admitted_rotations(config.rotation_step);
    let mut instances: Vec<Instance> = Vec::new();
    let mut skipped: Vec<SkippedInstance> = Vec::new();

    for part in parts {
        if part.quantity == 0 {
            continue;
        }
        if part.polygon.is_empty() || part.polygon.area() <= 0.0 {
            for n in 1..=part.quantity {
                skipped.push(SkippedInstance {
                    part_id: part.id.clone(),
                    instance: n,
                    reason: "invalid buffered geometry".to_string(),
                });
            }
            continue;
        }
        let buffered = part.polygon.buffered(config.spacing / 2.0);
        let Some(buffered) = buffered.filter(|b| !b.is_empty() && b.area() > 0.0) else {
            for n in 1..=part.quantity {
                skipped.push(SkippedInstance {
                    part_id: part.id.clone(),
                    instance: n,
                    reason: "invalid buffered geometry".to_string(),
                });
            }
            continue;
        };
        let buffered = Rc::new(buffered);
        for n in 1..=part.quantity {
            instances.push(Instance {
                part_id: part.id.clone(),
                instance: n,
                original: part.polygon.clone(),
                buffered: buffered.clone(),
            });
        }
    }

    instances.sort_by(|a, b| {
        b.original
            .area()
            .partial_cmp(&a.original.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut remaining = Vec::new();
    for instance in instances {
        if fits_usable_area_at_any_rotation(
            &instance.original,
            &instance.buffered,
            &rotations,
            usable_width,
            usable_height,
        ) {
            remaining.push(instance);
        } else {
            skipped.push(SkippedInstance {
                part_id: instance.part_id,
                instance: instance.instance,
                reason: "too large for sheet at any rotation".to_string(),
            });
        }
    }

    let mut sheets: Vec<Sheet> = vec![Sheet {
        placements: Vec::new(),
        placed_buffered: Vec::new(),
    }];

    for instance in remaining {
        let placed = place_on_sheet(
            &instance,
            sheets.last_mut().unwrap(),
            &rotations,
            usable_width,
            usable_height,
            config.margin,
        );
        let placed = if placed {
            true
        } else {
            sheets.push(Sheet {
                placements: Vec::new(),
                placed_buffered: Vec::new(),
            });
            place_on_sheet(
                &instance,
                sheets.last_mut().unwrap(),
                &rotations,
                usable_width,
                usable_height,
                config.margin,
            )
        };
        if !placed {
            skipped.push(SkippedInstance {
                part_id: instance.part_id,
                instance: instance.instance,
                reason: "could not fit on any sheet".to_string(),
            });
        }
    }

    let usable_area = usable_width * usable_height;
    let mut sheet_results: Vec<SheetResult> = Vec::new();
    for sheet in sheets {
        if sheet.placements.is_empty() {
            continue;
        }
        let occupied: f64 = sheet.placements.iter().map(|p| p.polygon.area()).sum();
        sheet_results.push(SheetResult {
            index: sheet_results.len() + 1,
            width: config.sheet_width,
            height: config.sheet_height,
            utilization: occupied / usable_area,
            placements: sheet.placements,
        });
    }

    let total_parts_placed: usize = sheet_results.iter().map(|s| s.placements.len()).sum();
    let avg_utilization = if sheet_results.is_empty() {
        0.0
    } else {
        sheet_results.iter().map(|s| s.utilization).sum::<f64>() / sheet_results.len() as f64
    };

    NestingResult {
        total_sheets: sheet_results.len(),
        total_parts_placed,
        avg_utilization,
        sheets: sheet_results,
        skipped,
    }
}

fn place_on_sheet(
    instance: &Instance,
    sheet: &mut Sheet,
    rotations: &[f64],
    usable_width: f64,
    usable_height: f64,
    margin: f64,
) -> bool {
    let Some(candidate) = best_candidate(
        &instance.original,
        &instance.buffered,
        rotations,
        usable_width,
        usable_height,
        margin,
        &sheet.placed_buffered,
    ) else {
        return false;
    };

    let final_original = candidate
        .normalized_original
        .translated(candidate.x + margin, candidate.y + margin);
    let final_buffered = candidate
        .normalized_buffered
        .translated(candidate.x + margin, candidate.y + margin);

    sheet.placements.push(Placement {
        part_id: instance.part_id.clone(),
        instance: instance.instance,
        rotation: candidate.rotation,
        x: candidate.x + margin,
        y: candidate.y + margin,
        polygon: final_original,
    });
    sheet.placed_buffered.push(final_buffered);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Polygon {
        Polygon::from_points(&[
            Point2D::new(0.0, 0.0),
            Point2D::new(side, 0.0),
            Point2D::new(side, side),
            Point2D::new(0.0, side),
        ])
        .unwrap()
    }

    fn rect(w: f64, h: f64) -> Polygon {
        Polygon::from_points(&[
            Point2D::new(0.0, 0.0),
            Point2D::new(w, 0.0),
            Point2D::new(w, h),
            Point2D::new(0.0, h),
        ])
        .unwrap()
    }

    fn part(id: &str, polygon: Polygon, quantity: u32) -> PartInput {
        PartInput {
            id: id.to_string(),
            polygon,
            quantity,
        }
    }

    #[test]
    fn scenario_single_square_trivial() {
        let parts = vec![part("A", square(2.0), 1)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 90.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 1);
        assert_eq!(result.total_parts_placed, 1);
        let p = &result.sheets[0].placements[0];
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
        assert_eq!(p.rotation, 0.0);
        assert!((result.sheets[0].utilization - 4.0 / 81.0).abs() < 1e-4);
    }

    #[test]
    fn scenario_two_copies_side_by_side() {
        let parts = vec![part("A", square(2.0), 2)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 90.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 1);
        assert_eq!(result.total_parts_placed, 2);
        let placements = &result.sheets[0].placements;
        assert!((placements[0].x - 0.5).abs() < 1e-6);
        assert!((placements[0].y - 0.5).abs() < 1e-6);
        assert!((placements[1].x - 2.625).abs() < 1e-6);
        assert!((placements[1].y - 0.5).abs() < 1e-6);
        assert!((result.sheets[0].utilization - 8.0 / 81.0).abs() < 1e-4);
    }

    #[test]
    fn scenario_overflow_to_new_sheet() {
        let parts = vec![part("A", square(4.0), 5)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 5.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 2);
        assert_eq!(result.total_parts_placed, 5);
    }

    #[test]
    fn scenario_oversize_rejection() {
        let parts = vec![part("A", square(20.0), 3)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 5.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 0);
        assert_eq!(result.skipped.len(), 3);
        assert!(result
            .skipped
            .iter()
            .all(|s| s.reason == "too large for sheet at any rotation"));
    }

    #[test]
    fn scenario_rotation_required() {
        let parts = vec![part("A", rect(9.0, 1.0), 2)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 2.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 90.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 2);
        assert_eq!(result.total_parts_placed, 2);
    }

    #[test]
    fn scenario_mixed_parts() {
        let parts = vec![part("A", square(3.0), 2), part("B", square(1.0), 4)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 90.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 1);
        assert_eq!(result.total_parts_placed, 6);
        assert!((result.sheets[0].utilization - (2.0 * 9.0 + 4.0 * 1.0) / 81.0).abs() < 1e-3);
    }

    #[test]
    fn boundary_rotation_step_zero_tries_only_zero() {
        assert_eq!(admitted_rotations(0.0), vec![0.0]);
    }

    #[test]
    fn boundary_rotation_step_360_tries_only_zero() {
        assert_eq!(admitted_rotations(360.0), vec![0.0]);
    }

    #[test]
    fn boundary_zero_quantity_contributes_nothing() {
        let parts = vec![part("A", square(2.0), 0)];
        let config = NestConfig::default();
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 0);
        assert!(result.skipped.is_empty());
        assert_eq!(result.total_parts_placed, 0);
    }

    #[test]
    fn boundary_margin_too_large_returns_empty() {
        let parts = vec![part("A", square(2.0), 1)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 6.0,
            rotation_step: 5.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 0);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn boundary_exact_fit_places_at_margin() {
        let parts = vec![part("A", square(9.0), 1)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 5.0,
        };
        let result = nest_instances(&parts, &config);
        assert_eq!(result.total_sheets, 1);
        let p = &result.sheets[0].placements[0];
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn determinism_two_runs_match() {
        let parts = vec![part("A", square(3.0), 2), part("B", square(1.0), 4)];
        let config = NestConfig {
            sheet_width: 10.0,
            sheet_height: 10.0,
            spacing: 0.125,
            margin: 0.5,
            rotation_step: 90.0,
        };
        let r1 = nest_instances(&parts, &config);
        let r2 = nest_instances(&parts, &config);
        assert_eq!(r1.total_sheets, r2.total_sheets);
        for (s1, s2) in r1.sheets.iter().zip(r2.sheets.iter()) {
            for (p1, p2) in s1.placements.iter().zip(s2.placements.iter()) {
                assert_eq!(p1.part_id, p2.part_id);
                assert_eq!(p1.instance, p2.instance);
                assert_eq!(p1.rotation, p2.rotation);
                assert!((p1.x - p2.x).abs() < 1e-12);
                assert!((p1.y - p2.y).abs() < 1e-12);
            }
        }
    }
}
