use crate::error::Result;
use crate::pipeline::Stage;
use clap::Parser;
use std::ffi::OsString;

#[derive(Parser, Debug)]
#[command(name = "kws")]
#[command(version)]
#[command(about = "Train, freeze, convert and evaluate a keyword-spotting model")]
pub struct Cli {
    /// Life-cycle stage to run
    #[arg(value_enum)]
    pub stage: Stage,
}

impl Cli {
    /// Parse exactly one stage argument; any other arity is an argument error
    pub fn parse_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::try_parse_from(args)?)
    }
}
