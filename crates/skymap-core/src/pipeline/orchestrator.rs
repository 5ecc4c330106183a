use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, SkymapError};
use crate::instrument::Instrument;
use crate::reduce::ReductionEngine;
use crate::scan::Scan;
use crate::source::SourceModel;

use super::config::ReductionConfig;
use super::types::{NoOpReporter, ProgressReporter, ReductionOutput, ReductionStage};

/// Reduce `scans` into a source model without progress reporting.
pub fn run_reduction(
    scans: &mut [Scan],
    instrument: &Instrument,
    config: &ReductionConfig,
) -> Result<ReductionOutput> {
    run_reduction_with_reporter(scans, instrument, config, Arc::new(NoOpReporter))
}

/// Reduce `scans` into a source model.
///
/// Each round clears the planes, accumulates every integration (directly,
/// or through per-scan maps when scan weighting is on), finalizes the map,
/// then removes it from the data and records it as the new base.
pub fn run_reduction_with_reporter(
    scans: &mut [Scan],
    instrument: &Instrument,
    config: &ReductionConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<ReductionOutput> {
    config.validate()?;
    if scans.is_empty() {
        return Err(SkymapError::EmptySequence);
    }
    let engine = ReductionEngine::new(config.thread_count())?;
    let integrations: usize = scans.iter().map(|s| s.integrations.len()).sum();
    info!(
        scans = scans.len(),
        integrations,
        channels = instrument.channel_count(),
        threads = engine.threads(),
        "Starting reduction"
    );

    reporter.begin_stage(ReductionStage::Sizing, None);
    let mut model = SourceModel::create(scans, instrument, config, &engine)?;
    reporter.finish_stage();

    let mut contributions = 0;
    let mut rounds = 0;
    for round in 0..config.rounds {
        reporter.begin_round(round + 1, config.rounds);
        rounds = round + 1;

        reporter.begin_stage(ReductionStage::Accumulating, Some(integrations));
        model.reset();
        contributions = match config.scan_weighting {
            Some(method) => accumulate_weighted(
                &mut model,
                scans,
                instrument,
                method.is_robust(),
                &engine,
                reporter.as_ref(),
            )?,
            None => accumulate_direct(&mut model, scans, instrument, &engine, reporter.as_ref()),
        };
        reporter.finish_stage();

        reporter.begin_stage(ReductionStage::Finalizing, None);
        model.finalize(&engine);
        reporter.finish_stage();

        if model.is_empty() {
            warn!(round = round + 1, "Source model is empty, stopping");
            break;
        }

        reporter.begin_stage(ReductionStage::Synchronizing, Some(integrations));
        let mut synced = 0;
        for scan in scans.iter_mut() {
            for integration in scan.integrations.iter_mut() {
                if let Some(range) = &config.coupling {
                    model.estimate_coupling(integration, instrument, range, &engine);
                }
                synced += model.sync(integration, instrument, &engine);
                reporter.advance(1);
            }
        }
        model.set_base();
        reporter.finish_stage();

        info!(
            round = round + 1,
            contributions,
            synced,
            points = model.count_points(),
            "Round complete"
        );
    }

    let pointing = match &config.pointing {
        Some(pointing) if !model.is_empty() => {
            reporter.begin_stage(ReductionStage::Pointing, None);
            let peak = model.pointing(pointing, &engine);
            reporter.finish_stage();
            peak
        }
        _ => None,
    };

    Ok(ReductionOutput {
        model,
        rounds,
        contributions,
        pointing,
    })
}

fn is_first_generation(scan: &Scan) -> bool {
    scan.integrations.iter().all(|i| i.source_generation == 0)
}

fn accumulate_direct(
    model: &mut SourceModel,
    scans: &[Scan],
    instrument: &Instrument,
    engine: &ReductionEngine,
    reporter: &dyn ProgressReporter,
) -> usize {
    let mut contributions = 0;
    for scan in scans {
        for integration in &scan.integrations {
            contributions += model.accumulate(integration, instrument, engine);
            reporter.advance(1);
        }
    }
    model.end_accumulation(scans.iter().all(is_first_generation), instrument);
    contributions
}

/// Accumulate each scan into its own map, weight it by its inverse reduced
/// chi-squared, and add it into the master.
fn accumulate_weighted(
    model: &mut SourceModel,
    scans: &mut [Scan],
    instrument: &Instrument,
    robust: bool,
    engine: &ReductionEngine,
    reporter: &dyn ProgressReporter,
) -> Result<usize> {
    let mut contributions = 0;
    for scan in scans.iter_mut() {
        let mut scan_map = model.empty_copy();
        let mut samples = 0;
        for integration in &scan.integrations {
            samples += scan_map.accumulate(integration, instrument, engine);
            reporter.advance(1);
        }
        scan_map.end_accumulation(is_first_generation(scan), instrument);

        let chi2 = scan_map.chi2(robust);
        scan.weight = if chi2.is_finite() && chi2 > 0.0 {
            1.0 / chi2
        } else {
            warn!(scan = %scan.id, chi2, "Unusable scan chi2, setting weight to zero");
            0.0
        };
        debug!(scan = %scan.id, chi2, weight = scan.weight, "Scan weighted");

        if scan.weight > 0.0 {
            model.add_weighted(&scan_map, scan.weight)?;
            contributions += samples;
        }
    }
    Ok(contributions)
}
