/**
 * Figures of the analyses, as pgfplots pictures.
 *
 * Every figure is written as a standalone `.tex` file, and optionally compiled with LuaLaTeX.
 * A failed compilation is only logged, the `.tex` file remains usable.
 */
use crate::prefetch::NextLineScatter;
use cache_timing_results::histograms::Histogram;
use cache_timing_results::matrices::{OccupancyWindow, StrideMatrix};
use cache_timing_results::statistics::LatencyBounds;
use cache_timing_results::tables::TimingTable;
use pgfplots::axis::plot::Type2D::ConstLeft;
use pgfplots::axis::plot::coordinate::Coordinate2D;
use pgfplots::axis::plot::{Plot2D, PlotKey};
use pgfplots::axis::{Axis, AxisKey};
use pgfplots::{Engine, Picture};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Colour scale bounds of the occupancy heatmaps.
pub const HEATMAP_MIN_CYCLES: f64 = 50.0;
pub const HEATMAP_MAX_CYCLES: f64 = 300.0;
/// Right limit of the latency histograms.
pub const HISTOGRAM_MAX_CYCLES: f64 = 350.0;

pub const LATENCIES_NAME: &str = "latencies";
pub const NEXT_LINE_NAME: &str = "next_line";
pub const STRIDE_HEATMAP_NAME: &str = "stride_heatmap";
pub const OCCUPANCY_FOLDER: &str = "occupancy";

const HISTOGRAM_COLORS: [&str; 4] = ["HistBlue", "HistRed", "HistGreen", "HistPurple"];

const PREAMBLE: &str = r#"\definecolor{HistRed}{HTML}{E41A1C}
\definecolor{HistBlue}{HTML}{377EB8}
\definecolor{HistGreen}{HTML}{4DAF4A}
\definecolor{HistPurple}{HTML}{984EA3}
\usepgfplotslibrary{colorbrewer}
"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Receives every artifact the analyses produce.
pub trait Renderer {
    /// Distribution of each cache level, with the L2 upper and L3 lower bounds.
    fn latency_histogram(
        &mut self,
        timing: &TimingTable,
        bounds: &LatencyBounds,
    ) -> Result<(), RenderError>;

    fn next_line_scatter(&mut self, scatter: &NextLineScatter) -> Result<(), RenderError>;

    fn stride_heatmap(&mut self, matrix: &StrideMatrix) -> Result<(), RenderError>;

    /// `name` identifies the occupancy input, see `OccupancyInput::artifact_name`.
    fn occupancy_heatmap(&mut self, name: &str, window: &OccupancyWindow)
    -> Result<(), RenderError>;
}

/// Plotting disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn latency_histogram(&mut self, _: &TimingTable, _: &LatencyBounds) -> Result<(), RenderError> {
        Ok(())
    }

    fn next_line_scatter(&mut self, _: &NextLineScatter) -> Result<(), RenderError> {
        Ok(())
    }

    fn stride_heatmap(&mut self, _: &StrideMatrix) -> Result<(), RenderError> {
        Ok(())
    }

    fn occupancy_heatmap(&mut self, _: &str, _: &OccupancyWindow) -> Result<(), RenderError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgfRenderer {
    folder: PathBuf,
    compile_pdf: bool,
}

impl PgfRenderer {
    pub fn new(folder: impl Into<PathBuf>, compile_pdf: bool) -> Self {
        Self {
            folder: folder.into(),
            compile_pdf,
        }
    }

    fn write(&self, mut picture: Picture, folder: &Path, jobname: &str) -> Result<(), RenderError> {
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |error| RenderError::Io { path, error }
        };
        std::fs::create_dir_all(folder).map_err(io_error(folder))?;

        picture.add_to_preamble(vec![String::from(PREAMBLE)]);
        let tex = folder.join(format!("{}.tex", jobname));
        std::fs::write(&tex, picture.standalone_string()).map_err(io_error(&tex))?;
        tracing::info!(path = %tex.display(), "wrote figure");

        if self.compile_pdf {
            match picture.to_pdf(folder, jobname, Engine::LuaLatex) {
                Ok(_) => tracing::info!(folder = %folder.display(), jobname, "compiled figure"),
                Err(e) => tracing::warn!("Failed to create PDF: {}, {:?}", jobname, e),
            }
        }
        Ok(())
    }
}

fn histogram_points(histogram: &Histogram) -> (Vec<Coordinate2D>, f64) {
    let coordinates = histogram
        .iter()
        .map(|(time, count)| Coordinate2D::from((time as f64, count as f64)))
        .collect();
    (coordinates, histogram.max_count() as f64)
}

fn vertical_line(x: f64, ymax: f64, style: &str) -> Plot2D {
    let mut line = Plot2D::new();
    line.coordinates = vec![
        Coordinate2D::from((x, 0.)),
        Coordinate2D::from((x, ymax)),
    ];
    line.add_key(PlotKey::Custom(String::from(style)));
    line
}

fn meta_coordinate(x: f64, y: f64, meta: Option<f64>) -> Coordinate2D {
    Coordinate2D {
        x,
        y,
        error_x: None,
        error_y: None,
        // Missing cells are left blank by `unbounded coords=jump`.
        point_meta: Some(meta.unwrap_or(f64::NAN)),
    }
}

fn tick_labels<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

impl Renderer for PgfRenderer {
    fn latency_histogram(
        &mut self,
        timing: &TimingTable,
        bounds: &LatencyBounds,
    ) -> Result<(), RenderError> {
        let mut axis = Axis::new();
        axis.set_title("Access latency per cache level");
        let mut ymax = 0.0;
        // The ceiling itself is a kept value.
        let xmax = (bounds.ram_ceiling.floor() + 1.0).min(HISTOGRAM_MAX_CYCLES);

        for (i, column) in timing.columns().iter().enumerate() {
            let values = timing.rows().iter().map(|row| row[i]);
            let histogram = Histogram::from_values(values, 1, xmax);
            let (coordinates, ymax_local) = histogram_points(&histogram);
            if ymax < ymax_local {
                ymax = ymax_local
            }
            let mut plot = Plot2D::new();
            plot.add_key(PlotKey::Type2D(ConstLeft));
            plot.coordinates = coordinates;
            plot.add_key(PlotKey::Custom(format!(
                "draw={}, thin",
                HISTOGRAM_COLORS[i % HISTOGRAM_COLORS.len()]
            )));
            axis.plots.push(plot);
            tracing::debug!(column = %column, recorded = histogram.total(), "histogram plotted");
        }

        axis.plots
            .push(vertical_line(bounds.l2_upper, ymax, "draw=black, dashed"));
        axis.plots
            .push(vertical_line(bounds.l3_lower, ymax, "draw=black, dotted"));
        axis.add_key(AxisKey::Custom(format!(
            "height=10cm, width=20cm, xmin=0, xmax={}, ymin=0, ymax={}, xlabel={{Cycles}}, ylabel={{Count}}, legend entries={{{}}}, tick align=outside, tick pos=left, axis on top,",
            xmax,
            ymax,
            tick_labels(timing.columns())
        )));

        let mut picture = Picture::new();
        picture.axes.push(Box::new(axis));
        self.write(picture, &self.folder, LATENCIES_NAME)
    }

    fn next_line_scatter(&mut self, scatter: &NextLineScatter) -> Result<(), RenderError> {
        let mut plot = Plot2D::new();
        plot.coordinates = scatter
            .points
            .iter()
            .map(|p| meta_coordinate(p.training_size as f64, p.cycles, Some(p.mark_size)))
            .collect();
        plot.add_key(PlotKey::Custom(String::from(
            "scatter, only marks, mark=*, point meta=explicit, scatter/use mapped color={draw=HistBlue, fill=HistBlue}, scatter/@pre marker code/.append style={/tikz/mark size=1pt+\\pgfplotspointmetatransformed/500}",
        )));

        let mut axis = Axis::new();
        axis.set_title("Next line prefetcher");
        let ymax = match scatter.y_max {
            Some(y) => format!("ymax={}, ", y),
            None => String::new(),
        };
        axis.add_key(AxisKey::Custom(format!(
            "height=10cm, width=20cm, xmin=-0.5, xmax={}, ymin=0, {}xlabel={{Training size}}, ylabel={{Cycles}}, tick align=outside, tick pos=left,",
            scatter.max_training_size as f64 + 0.5,
            ymax
        )));
        axis.plots.push(plot);

        let mut picture = Picture::new();
        picture.axes.push(Box::new(axis));
        self.write(picture, &self.folder, NEXT_LINE_NAME)
    }

    fn stride_heatmap(&mut self, matrix: &StrideMatrix) -> Result<(), RenderError> {
        let mut plot = Plot2D::new();
        // Strides are not evenly spaced, columns are placed by position.
        plot.coordinates = matrix
            .training_sizes
            .iter()
            .zip(matrix.cells.iter())
            .flat_map(|(&training_size, row)| {
                row.iter().enumerate().map(move |(column, &cell)| {
                    meta_coordinate(column as f64, training_size as f64, cell)
                })
            })
            .collect();
        plot.add_key(PlotKey::Custom(format!(
            "matrix plot*, mesh/cols={}, point meta=explicit, unbounded coords=jump",
            matrix.strides.len()
        )));

        let mut axis = Axis::new();
        axis.set_title("Stride prefetcher");
        axis.add_key(AxisKey::Custom(format!(
            "height=10cm, width=20cm, enlargelimits=false, colorbar, colormap/viridis, xtick={{0,...,{}}}, xticklabels={{{}}}, xlabel={{Stride}}, ylabel={{Training size}}, y dir=reverse,",
            matrix.strides.len().saturating_sub(1),
            tick_labels(&matrix.strides)
        )));
        axis.plots.push(plot);

        let mut picture = Picture::new();
        picture.axes.push(Box::new(axis));
        self.write(picture, &self.folder, STRIDE_HEATMAP_NAME)
    }

    fn occupancy_heatmap(
        &mut self,
        name: &str,
        window: &OccupancyWindow,
    ) -> Result<(), RenderError> {
        let matrix = &window.matrix;
        let mut plot = Plot2D::new();
        plot.coordinates = matrix
            .set_indices
            .iter()
            .zip(matrix.cells.iter())
            .flat_map(|(&set_index, row)| {
                matrix
                    .line_indices
                    .iter()
                    .zip(row.iter())
                    .map(move |(&line_index, &cell)| {
                        meta_coordinate(line_index as f64, set_index as f64, cell)
                    })
            })
            .collect();
        plot.add_key(PlotKey::Custom(format!(
            "matrix plot*, mesh/cols={}, point meta=explicit, unbounded coords=jump",
            matrix.line_indices.len()
        )));

        let mut axis = Axis::new();
        axis.set_title(&format!(
            "Set {} with {} warmup lines",
            window.target_set, window.warmup_lines
        ));
        axis.add_key(AxisKey::Custom(format!(
            "height=10cm, width=12cm, enlargelimits=false, colorbar, colormap/viridis, point meta min={}, point meta max={}, xlabel={{Line}}, ylabel={{Set}}, ymin={}, ymax={}, y dir=reverse,",
            HEATMAP_MIN_CYCLES,
            HEATMAP_MAX_CYCLES,
            window.first_set as f64 - 0.5,
            window.last_set as f64 + 0.5
        )));
        axis.plots.push(plot);

        if let (Some(&first), Some(&last)) =
            (matrix.line_indices.first(), matrix.line_indices.last())
        {
            let mut target = Plot2D::new();
            target.coordinates = vec![
                Coordinate2D::from((first as f64 - 0.5, window.target_set as f64)),
                Coordinate2D::from((last as f64 + 0.5, window.target_set as f64)),
            ];
            target.add_key(PlotKey::Custom(String::from("draw=HistRed, thick")));
            axis.plots.push(target);
        }

        let mut picture = Picture::new();
        picture.axes.push(Box::new(axis));
        self.write(picture, &self.folder.join(OCCUPANCY_FOLDER), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_timing_results::matrices::SetByLineMatrix;

    #[test]
    fn writes_tex_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = PgfRenderer::new(dir.path(), false);

        let timing = TimingTable::parse(&b"L2,L3,RAM\n10,50,200\n12,52,210\n"[..], "t").unwrap();
        let bounds = LatencyBounds {
            l2_upper: 12.0,
            l3_lower: 49.0,
            l3_upper: 53.0,
            ram_ceiling: 212.0,
            l3_upper_sigmas: 1.0,
        };
        renderer.latency_histogram(&timing, &bounds).unwrap();

        let matrix = StrideMatrix {
            training_sizes: vec![0, 1],
            strides: vec![1, 2],
            cells: vec![vec![Some(200.0), Some(210.0)], vec![Some(60.0), None]],
        };
        renderer.stride_heatmap(&matrix).unwrap();

        let window = OccupancyWindow {
            target_set: 3,
            warmup_lines: 2,
            first_set: 0,
            last_set: 20,
            matrix: SetByLineMatrix {
                set_indices: vec![2, 3],
                line_indices: vec![0, 1],
                cells: vec![vec![Some(60.0), Some(70.0)], vec![Some(250.0), None]],
            },
        };
        renderer.occupancy_heatmap("s3_w2", &window).unwrap();

        for path in [
            dir.path().join("latencies.tex"),
            dir.path().join("stride_heatmap.tex"),
            dir.path().join("occupancy").join("s3_w2.tex"),
        ] {
            let tex = std::fs::read_to_string(&path).unwrap();
            assert!(!tex.is_empty(), "{} is empty", path.display());
        }
        assert!(
            std::fs::read_to_string(dir.path().join("stride_heatmap.tex"))
                .unwrap()
                .contains("matrix plot*")
        );
        assert!(!dir.path().join("latencies.pdf").exists());
    }

    #[test]
    fn wrapped_counter_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = PgfRenderer::new(dir.path(), false);
        let timing = TimingTable::parse(
            &b"L2,RAM\n10,200\n12,18446744073709551615\n"[..],
            "t",
        )
        .unwrap();
        let bounds = LatencyBounds {
            l2_upper: 12.0,
            l3_lower: 49.0,
            l3_upper: 53.0,
            ram_ceiling: 7.678e18,
            l3_upper_sigmas: 1.0,
        };
        renderer.latency_histogram(&timing, &bounds).unwrap();
        let tex = std::fs::read_to_string(dir.path().join("latencies.tex")).unwrap();
        assert!(tex.contains("xmax=350,"));
    }

    #[test]
    fn unwritable_folder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "").unwrap();
        let mut renderer = PgfRenderer::new(&file, false);
        let scatter = NextLineScatter {
            points: Vec::new(),
            y_max: None,
            max_training_size: 0,
        };
        assert!(matches!(
            renderer.next_line_scatter(&scatter),
            Err(RenderError::Io { .. })
        ));
    }
}
