//! Life-cycle stages and the collaborators each one needs

use crate::calibration::RepresentativeDataset;
use crate::config::Config;
use crate::conversion::{ConversionBackend, ModelConverter, SavedModel, TfliteConverterCli};
use crate::data::{FeatureStore, SampleProvider};
use crate::error::Result;
use crate::evaluation::{AccuracyResult, Evaluator};
use crate::models::artifact::{DeployableArtifact, ModelKind};
use crate::models::c_source::export_c_source;
use crate::models::interpreter::{ArtifactLoader, TfliteLoader};
use crate::toolkit::{Freezer, SpeechCommandsToolkit, Trainer};
use std::path::PathBuf;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Train,
    Freeze,
    Convert,
    Eval,
}

/// What a stage run produced
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Trained,
    Frozen(SavedModel),
    /// C source rendered from the existing quantized artifact
    Exported { path: PathBuf, size_bytes: u64 },
    Evaluated {
        artifacts: Vec<DeployableArtifact>,
        results: Vec<AccuracyResult>,
    },
}

pub struct Pipeline<'a> {
    config: &'a Config,
    trainer: Box<dyn Trainer + 'a>,
    freezer: Box<dyn Freezer + 'a>,
    backend: Box<dyn ConversionBackend + 'a>,
    loader: Box<dyn ArtifactLoader + 'a>,
    provider: Box<dyn SampleProvider + 'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        trainer: Box<dyn Trainer + 'a>,
        freezer: Box<dyn Freezer + 'a>,
        backend: Box<dyn ConversionBackend + 'a>,
        loader: Box<dyn ArtifactLoader + 'a>,
        provider: Box<dyn SampleProvider + 'a>,
    ) -> Self {
        Self {
            config,
            trainer,
            freezer,
            backend,
            loader,
            provider,
        }
    }

    /// Toolkit scripts, the TFLite converter and runtime, and features from `features_dir`
    pub fn with_defaults(config: &'a Config) -> Self {
        let toolkit = SpeechCommandsToolkit::new(config.python.clone());
        Self::new(
            config,
            Box::new(toolkit.clone()),
            Box::new(toolkit),
            Box::new(TfliteConverterCli::new(config.python.clone())),
            Box::new(TfliteLoader::default()),
            Box::new(FeatureStore::new(
                &config.features_dir,
                config.model_settings(),
            )),
        )
    }

    pub fn run(&mut self, stage: Stage) -> Result<StageOutcome> {
        log::info!("Running {} stage", stage);
        match stage {
            Stage::Train => {
                self.trainer.train(self.config)?;
                Ok(StageOutcome::Trained)
            }
            Stage::Freeze => Ok(StageOutcome::Frozen(self.freezer.freeze(self.config)?)),
            Stage::Convert => {
                let path = self.config.model_tflite_micro();
                let size_bytes = export_c_source(
                    &self.config.model_tflite(),
                    &path,
                    &self.config.c_array_name,
                )?;
                Ok(StageOutcome::Exported { path, size_bytes })
            }
            Stage::Eval => {
                let artifacts = self.convert()?;
                let results = self.evaluate(&artifacts)?;
                Ok(StageOutcome::Evaluated { artifacts, results })
            }
        }
    }

    fn convert(&mut self) -> Result<Vec<DeployableArtifact>> {
        let model = SavedModel::open(self.config.saved_model())?;
        let settings = self.config.model_settings();
        let converter = ModelConverter::new(&*self.backend, self.config);
        let mut dataset = RepresentativeDataset::new(&mut *self.provider, &settings, self.config);
        converter.convert_all(&model, &mut dataset)
    }

    /// Float first, then quantized; each run completes before the next starts
    fn evaluate(&mut self, artifacts: &[DeployableArtifact]) -> Result<Vec<AccuracyResult>> {
        let mut evaluator = Evaluator::new(&mut *self.provider, &*self.loader, self.config);
        let mut results = Vec::with_capacity(artifacts.len());
        for kind in [ModelKind::Float, ModelKind::Quantized] {
            for artifact in artifacts.iter().filter(|a| a.kind == kind) {
                let result = evaluator.evaluate(&artifact.path, artifact.kind)?;
                println!("{}", result);
                results.push(result);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_stage_names() {
        let names: Vec<String> = Stage::value_variants().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["train", "freeze", "convert", "eval"]);
        assert_eq!(Stage::from_str("eval", false).unwrap(), Stage::Eval);
        assert!(Stage::from_str("evaluate", false).is_err());
    }
}
