//! Plot rendering - turn logged series into PNG line plots.
//!
//! Each plot is built as an SVG string (axes, ticks, title, labels, one
//! polyline), resolved with usvg and rasterized with resvg onto a
//! tiny-skia pixmap. The PNG is written to disk and then re-read to get
//! the pixel dimensions and pixels the display needs.
//!
//! Page size is fixed at 210 mm × 147 mm, rasterized at 96 DPI.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use quick_xml::escape::escape;
use resvg::usvg;
use tiny_skia::Pixmap;

use crate::error::PendulumError;
use crate::trajectory::{SampleSeries, TrajectorySample};

pub const PAGE_WIDTH_MM: f64 = 210.0;
pub const PAGE_HEIGHT_MM: f64 = 147.0;
pub const DPI: f64 = 96.0;

// Plot area margins in pixels
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;

const TARGET_TICKS: usize = 6;
const LINE_COLOR: &str = "#ff0000";

/// Raster size of the fixed page.
pub fn page_pixels() -> (u32, u32) {
    let to_px = |mm: f64| (mm / 25.4 * DPI).round() as u32;
    (to_px(PAGE_WIDTH_MM), to_px(PAGE_HEIGHT_MM))
}

/// The three diagnostic plots produced per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlotKind {
    /// Angle against time.
    Angle,
    /// Angular velocity against time.
    AngularVelocity,
    /// Angular velocity against angle.
    Phase,
}

impl PlotKind {
    pub fn all() -> [PlotKind; 3] {
        [PlotKind::Angle, PlotKind::AngularVelocity, PlotKind::Phase]
    }

    pub fn title(&self) -> &'static str {
        match self {
            PlotKind::Angle => "α(t)",
            PlotKind::AngularVelocity => "ω(t)",
            PlotKind::Phase => "Phase portrait",
        }
    }

    pub fn x_label(&self) -> &'static str {
        match self {
            PlotKind::Angle | PlotKind::AngularVelocity => "t",
            PlotKind::Phase => "α",
        }
    }

    pub fn y_label(&self) -> &'static str {
        match self {
            PlotKind::Angle => "α",
            PlotKind::AngularVelocity | PlotKind::Phase => "ω",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            PlotKind::Angle => "angle_graph.png",
            PlotKind::AngularVelocity => "ang_spd_graph.png",
            PlotKind::Phase => "phase_diagram.png",
        }
    }

    /// Tab caption for the presentation layer.
    pub fn caption(&self) -> &'static str {
        match self {
            PlotKind::Angle => "Oscillation",
            PlotKind::AngularVelocity => "Angular velocity",
            PlotKind::Phase => "Phase diagram",
        }
    }

    /// Pull the (x, y) columns this plot draws.
    pub fn series(&self, samples: &[TrajectorySample]) -> (Vec<f64>, Vec<f64>) {
        match self {
            PlotKind::Angle => (samples.times(), samples.angles()),
            PlotKind::AngularVelocity => (samples.times(), samples.angular_velocities()),
            PlotKind::Phase => (samples.angles(), samples.angular_velocities()),
        }
    }
}

/// A rendered plot, ready for display.
#[derive(Debug, Clone)]
pub struct PlotArtifact {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Where the PNG lives, if it was retained.
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// Pixels as re-read from the written file.
    pub image: RgbaImage,
}

impl PlotArtifact {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The three plots of one run.
#[derive(Debug, Clone)]
pub struct PlotSet {
    pub angle: PlotArtifact,
    pub angular_velocity: PlotArtifact,
    pub phase: PlotArtifact,
}

impl PlotSet {
    pub fn get(&self, kind: PlotKind) -> &PlotArtifact {
        match kind {
            PlotKind::Angle => &self.angle,
            PlotKind::AngularVelocity => &self.angular_velocity,
            PlotKind::Phase => &self.phase,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlotKind, &PlotArtifact)> {
        PlotKind::all().into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

/// Writes plot PNGs into a directory.
///
/// Cheap to clone: the font database is shared, so a renderer can be
/// handed to the run loop thread.
#[derive(Clone)]
pub struct PlotRenderer {
    output_dir: PathBuf,
    retain: bool,
    fontdb: Arc<usvg::fontdb::Database>,
}

impl std::fmt::Debug for PlotRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlotRenderer")
            .field("output_dir", &self.output_dir)
            .field("retain", &self.retain)
            .field("fonts", &self.fontdb.len())
            .finish()
    }
}

impl PlotRenderer {
    /// Create a renderer writing into `output_dir`, loading system fonts.
    ///
    /// With `retain == false` the PNG files are removed as soon as they
    /// have been read back.
    pub fn new(output_dir: impl Into<PathBuf>, retain: bool) -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        log::debug!("plot renderer loaded {} font faces", fontdb.len());
        Self::with_fonts(output_dir, retain, Arc::new(fontdb))
    }

    /// Create a renderer with a caller-supplied font database.
    pub fn with_fonts(
        output_dir: impl Into<PathBuf>,
        retain: bool,
        fontdb: Arc<usvg::fontdb::Database>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            retain,
            fontdb,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn retains(&self) -> bool {
        self.retain
    }

    /// Render all three plots for a (possibly partial) run.
    pub fn render_run(&self, samples: &[TrajectorySample]) -> Result<PlotSet, PendulumError> {
        let render_kind = |kind: PlotKind| {
            let (xs, ys) = kind.series(samples);
            self.render(&xs, &ys, kind.title(), kind.x_label(), kind.y_label(), kind.file_name())
        };

        let set = PlotSet {
            angle: render_kind(PlotKind::Angle)?,
            angular_velocity: render_kind(PlotKind::AngularVelocity)?,
            phase: render_kind(PlotKind::Phase)?,
        };
        log::info!(
            "rendered plots for {} samples into {}",
            samples.len(),
            self.output_dir.display()
        );
        Ok(set)
    }

    /// Render one line plot joining `(xs[i], ys[i])` in index order.
    ///
    /// Extra values in the longer series are ignored.
    pub fn render(
        &self,
        xs: &[f64],
        ys: &[f64],
        title: &str,
        x_label: &str,
        y_label: &str,
        file_name: &str,
    ) -> Result<PlotArtifact, PendulumError> {
        let (width, height) = page_pixels();
        let svg = build_plot_svg(xs, ys, title, x_label, y_label, width, height);

        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&self.fontdb);
        let tree = usvg::Tree::from_str(&svg, &options)
            .map_err(|e| PendulumError::Render(e.to_string()))?;

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| PendulumError::Render(format!("could not create {}x{} pixmap", width, height)))?;
        pixmap.fill(tiny_skia::Color::WHITE);
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        fs::create_dir_all(&self.output_dir).map_err(|e| PendulumError::artifact(&self.output_dir, e))?;
        let path = self.output_dir.join(file_name);
        pixmap.save_png(&path).map_err(|e| PendulumError::artifact(&path, e))?;

        // Re-read rather than trusting the pixmap: the display sizes itself
        // from what actually landed on disk.
        let image = image::open(&path)
            .map_err(|e| PendulumError::artifact(&path, e))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        log::debug!("wrote {} ({}x{})", path.display(), width, height);

        let path = if self.retain {
            Some(path)
        } else {
            fs::remove_file(&path).map_err(|e| PendulumError::artifact(&path, e))?;
            None
        };

        Ok(PlotArtifact {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            path,
            width,
            height,
            image,
        })
    }
}

// ============================================================================
// SVG construction
// ============================================================================

/// Data range of one axis, widened so it never collapses to a point.
fn axis_range(values: &[f64]) -> (f64, f64) {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &v in values.iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < f64::EPSILON * hi.abs().max(1.0) {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        return (lo - pad, hi + pad);
    }
    (lo, hi)
}

/// "Nice" tick positions (1, 2, 5 × 10ⁿ steps) covering `[lo, hi]`.
pub fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !(span.is_finite() && span > 0.0) || target == 0 {
        return vec![lo];
    }
    let raw = span / target as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);

    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(|i| i as f64 * step).collect()
}

fn format_tick(value: f64) -> String {
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

/// Build the SVG document for one line plot.
pub fn build_plot_svg(
    xs: &[f64],
    ys: &[f64],
    title: &str,
    x_label: &str,
    y_label: &str,
    width: u32,
    height: u32,
) -> String {
    let (w, h) = (width as f64, height as f64);
    let left = MARGIN_LEFT;
    let right = w - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = h - MARGIN_BOTTOM;

    let n = xs.len().min(ys.len());
    let (x_lo, x_hi) = axis_range(&xs[..n]);
    let (y_lo, y_hi) = axis_range(&ys[..n]);

    let map_x = |x: f64| left + (x - x_lo) / (x_hi - x_lo) * (right - left);
    let map_y = |y: f64| bottom - (y - y_lo) / (y_hi - y_lo) * (bottom - top);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<rect width="100%" height="100%" fill="white"/>
"#,
    ));

    // Title and axis labels
    svg.push_str(&format!(
        r##"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="20" fill="#000000">{}</text>
"##,
        w / 2.0,
        top - 18.0,
        escape(title)
    ));
    svg.push_str(&format!(
        r##"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="16" fill="#000000">{}</text>
"##,
        (left + right) / 2.0,
        h - 20.0,
        escape(x_label)
    ));
    let y_label_x = 24.0;
    let y_label_y = (top + bottom) / 2.0;
    svg.push_str(&format!(
        r##"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="16" fill="#000000" transform="rotate(-90, {:.2}, {:.2})">{}</text>
"##,
        y_label_x,
        y_label_y,
        y_label_x,
        y_label_y,
        escape(y_label)
    ));

    // Axes
    svg.push_str(&format!(
        r#"<g stroke="black" stroke-width="1" fill="none">
<line x1="{left:.2}" y1="{bottom:.2}" x2="{right:.2}" y2="{bottom:.2}"/>
<line x1="{left:.2}" y1="{top:.2}" x2="{left:.2}" y2="{bottom:.2}"/>
"#,
    ));
    let x_ticks = nice_ticks(x_lo, x_hi, TARGET_TICKS);
    let y_ticks = nice_ticks(y_lo, y_hi, TARGET_TICKS);
    for &t in &x_ticks {
        let x = map_x(t);
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\"/>\n",
            x, bottom, x, bottom + 6.0
        ));
    }
    for &t in &y_ticks {
        let y = map_y(t);
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\"/>\n",
            left - 6.0, y, left, y
        ));
    }
    svg.push_str("</g>\n");

    // Tick labels
    svg.push_str(r##"<g font-family="sans-serif" font-size="12" fill="#000000">"##);
    svg.push('\n');
    for &t in &x_ticks {
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{}</text>\n",
            map_x(t),
            bottom + 22.0,
            format_tick(t)
        ));
    }
    for &t in &y_ticks {
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\">{}</text>\n",
            left - 10.0,
            map_y(t) + 4.0,
            format_tick(t)
        ));
    }
    svg.push_str("</g>\n");

    // The series
    let points: Vec<String> = xs[..n]
        .iter()
        .zip(&ys[..n])
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| format!("{:.2},{:.2}", map_x(x), map_y(y)))
        .collect();
    if points.len() >= 2 {
        svg.push_str(&format!(
            "<polyline points=\"{}\" stroke=\"{}\" stroke-width=\"1.5\" fill=\"none\" stroke-linejoin=\"round\"/>\n",
            points.join(" "),
            LINE_COLOR
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pendulum-plot-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn renderer(dir: &Path, retain: bool) -> PlotRenderer {
        // No fonts keeps tests fast and independent of the host
        PlotRenderer::with_fonts(dir, retain, Arc::new(usvg::fontdb::Database::new()))
    }

    fn samples(n: usize) -> Vec<TrajectorySample> {
        (1..=n)
            .map(|i| {
                let t = i as f64 * 0.01;
                TrajectorySample::new(t, (t * 3.0).cos(), -(t * 3.0).sin() * 3.0)
            })
            .collect()
    }

    #[test]
    fn page_is_a4_landscape_strip_at_96_dpi() {
        assert_eq!(page_pixels(), (794, 556));
    }

    #[test]
    fn nice_ticks_cover_range_with_round_steps() {
        let ticks = nice_ticks(0.0, 10.0, 5);
        assert_eq!(ticks, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);

        let ticks = nice_ticks(-1.3, 1.3, 6);
        assert!(ticks.iter().all(|t| *t >= -1.3 && *t <= 1.3));
        assert!(ticks.contains(&0.0));
    }

    #[test]
    fn degenerate_ranges_are_widened() {
        assert_eq!(axis_range(&[]), (0.0, 1.0));
        assert_eq!(axis_range(&[0.0, 0.0]), (-1.0, 1.0));
        let (lo, hi) = axis_range(&[5.0]);
        assert!(lo < 5.0 && hi > 5.0);
    }

    #[test]
    fn svg_sets_title_and_labels_verbatim() {
        let svg = build_plot_svg(&[0.0, 1.0], &[1.0, 0.0], "α(t) <raw>", "t", "α", 794, 556);
        assert!(svg.contains("α(t) &lt;raw&gt;"));
        assert!(svg.contains(">t</text>"));
        assert!(svg.contains(">α</text>"));
        assert_eq!(svg.matches("<polyline").count(), 1);
    }

    #[test]
    fn series_points_follow_index_order() {
        let svg = build_plot_svg(&[0.0, 1.0, 0.5], &[0.0, 1.0, 0.5], "x", "x", "y", 794, 556);
        let points = svg
            .split("points=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        let xs: Vec<f64> = points
            .split(' ')
            .map(|p| p.split(',').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(xs.len(), 3);
        assert!(xs[0] < xs[2] && xs[2] < xs[1]);
    }

    #[test]
    fn render_run_reports_dimensions_and_cleans_up() {
        let dir = scratch_dir("transient");
        let set = renderer(&dir, false).render_run(&samples(200)).unwrap();

        for (kind, artifact) in set.iter() {
            assert_eq!(artifact.dimensions(), (794, 556));
            assert_eq!(artifact.title, kind.title());
            assert!(artifact.path.is_none());
            assert!(!dir.join(kind.file_name()).exists());
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn retained_artifacts_stay_on_disk() {
        let dir = scratch_dir("retained");
        let set = renderer(&dir, true).render_run(&samples(50)).unwrap();

        let path = set.phase.path.clone().unwrap();
        assert!(path.exists());
        assert_eq!(image::image_dimensions(&path).unwrap(), (794, 556));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_log_still_renders_axes() {
        let dir = scratch_dir("empty");
        let set = renderer(&dir, false).render_run(&[]).unwrap();
        assert_eq!(set.angle.dimensions(), (794, 556));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_directory_is_a_recoverable_error() {
        let dir = scratch_dir("blocked");
        fs::create_dir_all(dir.parent().unwrap()).unwrap();
        // A regular file where the output directory should be
        fs::write(&dir, b"not a directory").unwrap();

        let err = renderer(&dir, false).render_run(&samples(10)).unwrap_err();
        assert!(matches!(err, PendulumError::ArtifactIo { .. }));
        let _ = fs::remove_file(&dir);
    }
}
