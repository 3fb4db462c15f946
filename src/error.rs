use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open database {}", _0.display())]
    Database(#[error(not(source))] PathBuf),
    #[display("could not open library {}", _0.display())]
    Library(#[error(not(source))] PathBuf),
    #[display("scan could not start")]
    Scan,
    #[display("could not write job record {}", _0.display())]
    Job(#[error(not(source))] PathBuf),
}
