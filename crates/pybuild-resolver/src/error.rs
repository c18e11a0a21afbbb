use pybuild_pep508::Pep508Error;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to parse requirement: `{requirement}`")]
    Parse {
        requirement: String,
        #[source]
        err: Box<Pep508Error>,
    },
}
