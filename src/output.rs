use std::io::{self, Write};

use serde::Serialize;

use crate::batch::{LocationResult, PairOutcome};
use crate::reader::SampleBinCounts;

#[derive(Debug, Serialize)]
pub struct LocationView<'a> {
    pub location: String,
    pub samples: Vec<&'a SampleBinCounts>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PairErrorView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairErrorView {
    pub sample_id: String,
    pub error: String,
}

impl<'a> From<&'a LocationResult> for LocationView<'a> {
    fn from(result: &'a LocationResult) -> Self {
        Self {
            location: result.location.to_string(),
            samples: result.visible(),
            errors: result
                .slots
                .iter()
                .filter_map(|slot| match &slot.outcome {
                    PairOutcome::Failed { error, .. } => Some(PairErrorView {
                        sample_id: slot.sample_id.clone(),
                        error: error.to_string(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(results: &[LocationResult]) -> io::Result<()> {
        let views = results.iter().map(LocationView::from).collect::<Vec<_>>();
        Self::print_json(&views)
    }

    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
