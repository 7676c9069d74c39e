//! Window-less batch mode: runs the regular frame loop over the CPU engine.

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::effect::CpuNormalMapEngine;
use crate::effect::cpu::CpuBuffer;
use crate::frame::{FrameActions, FrameHost, FrameOutcome, PipelineError, UiFrame, Workshop};
use crate::params::ParameterSet;
use crate::source::SourceImage;

/// Replays one queued set of actions, then idles.
#[derive(Default)]
pub struct HeadlessHost {
    pending: Option<FrameActions>,
    pub presented: u32,
}

impl HeadlessHost {
    pub fn with_actions(actions: FrameActions) -> Self {
        Self {
            pending: Some(actions),
            presented: 0,
        }
    }
}

impl FrameHost<CpuBuffer> for HeadlessHost {
    fn poll_input(&mut self) {}

    fn render_ui(&mut self, _frame: UiFrame<'_, CpuBuffer>) -> FrameActions {
        self.pending.take().unwrap_or_default()
    }

    fn present(&mut self) -> Result<(), PipelineError> {
        self.presented += 1;
        Ok(())
    }
}

/// Loads `source`, adds one layer per parameter set, then runs a single
/// frame that applies every layer, composites and saves to `output`.
pub fn run(source: &Path, layers: &[ParameterSet], flip_y: bool, output: &Path) -> Result<FrameOutcome> {
    let source = SourceImage::load(source)?;
    run_with(source, layers, flip_y, output)
}

pub fn run_with(
    source: SourceImage,
    layers: &[ParameterSet],
    flip_y: bool,
    output: &Path,
) -> Result<FrameOutcome> {
    let mut workshop = Workshop::new(CpuNormalMapEngine::new(), source, flip_y);
    for params in layers {
        workshop.add_layer(*params).context("failed to add layer")?;
    }

    let mut host = HeadlessHost::with_actions(FrameActions {
        apply: true,
        add_layer: None,
        save: Some(output.to_path_buf()),
    });
    let outcome = workshop.run_frame(&mut host)?;
    log::info!(
        "Headless run: {} layer(s), composited: {}",
        workshop.layers().len(),
        outcome.composited
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    const FLAT: [u8; 4] = [128, 128, 255, 255];

    fn ramp(width: u32, height: u32) -> SourceImage {
        let mut pixels = Vec::new();
        for _ in 0..height {
            for x in 0..width {
                let v = (x * 255 / (width - 1)) as u8;
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        SourceImage::from_rgba(width, height, pixels).unwrap()
    }

    #[test]
    fn single_layer_saves_layer_image() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("flat.png");
        let outcome = run_with(
            SourceImage::solid(8, 8, [200, 30, 90, 255]),
            &[ParameterSet::default()],
            false,
            &out,
        )
        .unwrap();
        assert!(!outcome.composited);
        assert_eq!(outcome.saved.as_deref(), Some(out.as_path()));

        let saved = image::open(&out).unwrap().into_rgba8();
        assert_eq!(saved.dimensions(), (8, 8));
        assert!(saved.pixels().all(|p| p.0 == FLAT));
    }

    #[test]
    fn several_layers_composite_before_saving() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("combined.png");
        let layers: Vec<ParameterSet> = vec!["scale=2".parse().unwrap(), "blur=0".parse().unwrap()];
        let outcome = run_with(ramp(16, 4), &layers, false, &out).unwrap();
        assert!(outcome.composited);
        assert_eq!(outcome.regenerated.len(), 2);
        assert!(out.exists());
    }

    #[test]
    fn loads_source_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("albedo.png");
        source::save_rgba(&src, 4, 4, vec![77; 64]).unwrap();
        let out = dir.path().join("albedo_n.png");
        run(&src, &[ParameterSet::default()], true, &out).unwrap();
        assert!(out.exists());
    }

    #[test]
    fn missing_source_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            &dir.path().join("nope.png"),
            &[ParameterSet::default()],
            false,
            &dir.path().join("out.png"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("nope.png"));
    }
}
