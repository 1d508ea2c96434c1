use std::{error::Error, path::PathBuf};

use crate::{
    cli::command_handlers::do_generate,
    lister::GoModuleLister,
    resolver::{Resolution, ResolveOptions, Resolver},
};

mod builder;

pub use builder::GomodnixBuilder;

pub struct Gomodnix {
    root: PathBuf,
    outfile: PathBuf,
    infile: PathBuf,
    lister: GoModuleLister,
    resolver: Resolver,
    options: ResolveOptions,
}

impl Gomodnix {
    pub fn builder() -> GomodnixBuilder {
        GomodnixBuilder::default()
    }

    /// Lists the project's modules, pins them and writes the manifest
    pub fn generate(&self) -> Result<Resolution, Box<dyn Error>> {
        do_generate(
            &self.lister,
            &self.resolver,
            &self.options,
            &self.root,
            &self.outfile,
            &self.infile,
        )
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }
}
