/*
 * This Source Code Form is subject to the terms of the Mozilla Public License,
 * v. 2.0. If a copy of the MPL was not distributed with this file, You can
 * obtain one at http://mozilla.org/MPL/2.0/.
 *
 *
 * Copyright (c) 2019, Clemens Lutz <lutzcle@cml.li>
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 */

use plotters::style::{RGBColor, BLACK, WHITE};

/// Maps a normalized value in `[0, 1]` to a color.
pub trait ColorMap {
    fn color(&self, t: f64) -> RGBColor;
}

/// Diverging blue-gray-red map after K. Moreland, "Diverging Color Maps for
/// Scientific Visualization".
#[derive(Clone, Copy, Debug, Default)]
pub struct Coolwarm;

const COOLWARM: [(u8, u8, u8); 9] = [
    (59, 76, 192),
    (98, 130, 234),
    (141, 176, 254),
    (184, 208, 249),
    (221, 221, 221),
    (245, 196, 173),
    (244, 154, 123),
    (222, 96, 77),
    (180, 4, 38),
];

impl ColorMap for Coolwarm {
    fn color(&self, t: f64) -> RGBColor {
        let t = if t.is_nan() { 0.5 } else { t.max(0.0).min(1.0) };
        let scaled = t * (COOLWARM.len() - 1) as f64;
        let lower = (scaled.floor() as usize).min(COOLWARM.len() - 2);
        let frac = scaled - lower as f64;

        let (r0, g0, b0) = COOLWARM[lower];
        let (r1, g1, b1) = COOLWARM[lower + 1];
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;

        RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
    }
}

/// Normalizes `value` into `[0, 1]`; a degenerate range maps to the middle.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        ((value - min) / (max - min)).max(0.0).min(1.0)
    } else {
        0.5
    }
}

/// Relative luminance of an sRGB color, as defined by WCAG 2.0
pub fn relative_luminance(color: &RGBColor) -> f64 {
    let linear = |c: u8| {
        let c = c as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };

    0.2126 * linear(color.0) + 0.7152 * linear(color.1) + 0.0722 * linear(color.2)
}

/// Text color that stays readable on top of `background`
pub fn annotation_color(background: &RGBColor) -> RGBColor {
    if relative_luminance(background) > 0.408 {
        BLACK
    } else {
        WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coolwarm_end_points() {
        assert_eq!(Coolwarm.color(0.0), RGBColor(59, 76, 192));
        assert_eq!(Coolwarm.color(0.5), RGBColor(221, 221, 221));
        assert_eq!(Coolwarm.color(1.0), RGBColor(180, 4, 38));
    }

    #[test]
    fn coolwarm_clamps() {
        assert_eq!(Coolwarm.color(-3.0), Coolwarm.color(0.0));
        assert_eq!(Coolwarm.color(7.0), Coolwarm.color(1.0));
        assert_eq!(Coolwarm.color(f64::NAN), Coolwarm.color(0.5));
    }

    #[test]
    fn coolwarm_interpolates() {
        let RGBColor(r, g, b) = Coolwarm.color(0.0625);
        assert_eq!((r, g, b), (79, 103, 213));
    }

    #[test]
    fn normalize_degenerate_range() {
        assert_eq!(normalize(3.0, 3.0, 3.0), 0.5);
        assert_eq!(normalize(5.0, 0.0, 10.0), 0.5);
        assert_eq!(normalize(10.0, 0.0, 10.0), 1.0);
    }

    #[test]
    fn annotation_contrast() {
        assert_eq!(annotation_color(&RGBColor(221, 221, 221)), BLACK);
        assert_eq!(annotation_color(&RGBColor(59, 76, 192)), WHITE);
        assert_eq!(annotation_color(&RGBColor(180, 4, 38)), WHITE);
    }
}
