use sessionsplit_core::{PipelineError, dataset::DatasetError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Split failed: {source}"))]
    Pipeline { source: PipelineError },

    #[snafu(display(
        "Cannot load partition {dir}: {source}. \
         Point --dir at a train/ or test/ directory written by `sessionsplit process`."
    ))]
    LoadDataset { dir: String, source: DatasetError },
}
