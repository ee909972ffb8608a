//! Deterministic point layouts: obstacle outlines and circular formations

use std::f64::consts::PI;

use super::types::Vec2;

/// Evenly spaced samples over `[start, stop]`, or `[start, stop)` without the endpoint
pub fn linspace(start: f64, stop: f64, num: usize, endpoint: bool) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let divisions = if endpoint { num - 1 } else { num };
            let step = (stop - start) / divisions as f64;
            (0..num).map(|i| start + i as f64 * step).collect()
        }
    }
}

fn points_on_circle(center: Vec2, radius: f32, angles: &[f64]) -> Vec<Vec2> {
    angles
        .iter()
        .map(|&theta| {
            Vec2::new(
                center.x + (theta.cos() as f32) * radius,
                center.y + (theta.sin() as f32) * radius,
            )
        })
        .collect()
}

/// Sample `num` points on a circle outline. The angle `2π` is excluded so no
/// point is duplicated.
pub fn generate_obstacle_circle(center: Vec2, radius: f32, num: usize) -> Vec<Vec2> {
    let angles = linspace(0.0, 2.0 * PI, num, false);
    points_on_circle(center, radius, &angles)
}

/// Sample `num` points on a rectangle outline with side lengths `(a, b)`.
///
/// Half of the points go to the top and right sides in proportion to their
/// lengths, the bottom side mirrors the top, and the left side takes whatever
/// is left over.
pub fn generate_obstacle_rectangle(center: Vec2, sides: (f32, f32), num: usize) -> Vec<Vec2> {
    let (a, b) = sides;
    let half = num / 2;
    let n_side_1 = (half as f32 * a / (a + b)) as usize;
    let n_side_2 = half - n_side_1;
    let n_side_3 = n_side_1;
    let n_side_4 = num - n_side_1 - n_side_2 - n_side_3;

    let (ha, hb) = (a as f64 / 2.0, b as f64 / 2.0);
    let mut points = Vec::with_capacity(num);

    // Top edge, left to right
    for x in linspace(-ha, ha, n_side_1, false) {
        points.push(Vec2::new(x as f32, hb as f32));
    }
    // Right edge, top to bottom
    for y in linspace(hb, -hb, n_side_2, false) {
        points.push(Vec2::new(ha as f32, y as f32));
    }
    // Bottom edge, right to left
    for x in linspace(ha, -ha, n_side_3, false) {
        points.push(Vec2::new(x as f32, -hb as f32));
    }
    // Left edge, bottom to top
    for y in linspace(-hb, hb, n_side_4, false) {
        points.push(Vec2::new(-ha as f32, y as f32));
    }

    points.into_iter().map(|p| p + center).collect()
}

/// `num` points on a circle of `radius` around the origin, spanning
/// `[0, 2π]` inclusive of both ends. For `num > 1` the first and last points
/// coincide.
pub fn circular_formation(num: usize, radius: f32) -> Vec<Vec2> {
    let angles = linspace(0.0, 2.0 * PI, num, true);
    points_on_circle(Vec2::default(), radius, &angles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace_endpoint() {
        assert_eq!(linspace(0.0, 1.0, 5, true), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(0.0, 1.0, 4, false), vec![0.0, 0.25, 0.5, 0.75]);
        assert!(linspace(0.0, 1.0, 0, true).is_empty());
    }

    #[test]
    fn test_circular_formation_radius() {
        let formation = circular_formation(7, 0.5);
        assert_eq!(formation.len(), 7);
        for p in &formation {
            assert!((p.norm() - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_circular_formation_endpoints_coincide() {
        let formation = circular_formation(4, 1.0);
        assert!(formation[0].distance(&formation[3]) < 1e-6);
        assert!((formation[1].x - (-0.5)).abs() < 1e-6);
        assert!((formation[1].y - (3.0f32.sqrt() / 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_obstacle_circle_excludes_endpoint() {
        let center = Vec2::new(1.0, -1.0);
        let circle = generate_obstacle_circle(center, 2.0, 4);
        assert_eq!(circle.len(), 4);
        assert!((circle[0].x - 3.0).abs() < 1e-6);
        assert!((circle[2].x - (-1.0)).abs() < 1e-6);
        for p in &circle {
            assert!((p.distance(&center) - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_obstacle_rectangle_apportionment() {
        // num / 2 = 6; side 1 gets floor(6 * 2 / 3) = 4, side 2 gets 2,
        // side 3 mirrors side 1 and side 4 takes the remaining 3
        let rect = generate_obstacle_rectangle(Vec2::default(), (2.0, 1.0), 13);
        assert_eq!(rect.len(), 13);

        let bottom = rect[6..10].iter().filter(|p| (p.y + 0.5).abs() < 1e-6).count();
        let left = rect[10..].iter().filter(|p| (p.x + 1.0).abs() < 1e-6).count();
        assert_eq!(bottom, 4);
        assert_eq!(left, 3);
        assert_eq!(rect[0], Vec2::new(-1.0, 0.5));
        assert_eq!(rect[4], Vec2::new(1.0, 0.5));
    }

    #[test]
    fn test_obstacle_rectangle_translated() {
        let center = Vec2::new(3.0, 4.0);
        let rect = generate_obstacle_rectangle(center, (1.0, 1.0), 8);
        assert_eq!(rect.len(), 8);
        for p in &rect {
            let d = *p - center;
            let on_edge = (d.x.abs() - 0.5).abs() < 1e-6 || (d.y.abs() - 0.5).abs() < 1e-6;
            assert!(on_edge);
        }
    }
}
