//! IBM Cloud VPC provisioner (C7): reconciles a VPC instance by name,
//! tagged with a content-hash of its user-data, grounded on
//! `server/vpc/actions.go` and `vpc/{instance,image,subnet,search,tagging,service}.go`.

pub mod image;
pub mod instance;
pub mod provisioner;
pub mod service;
pub mod subnet;
pub mod tagging;

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

pub use provisioner::{finalize, sync};
pub use service::VpcService;

#[derive(Debug)]
pub struct VpcError {
    inner: Context<VpcErrKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum VpcErrKind {
    #[fail(display = "missing required configuration '{}'", _0)]
    MissingEnv(String),
    #[fail(display = "IAM token exchange failed: {}", _0)]
    AuthFailed(String),
    #[fail(display = "VPC API call '{}' failed ({}): {}", _0, _1, _2)]
    ApiCallFailed(String, u16, String),
    #[fail(display = "instance name '{}' is not unique, found {} matches", _1, _0)]
    InstanceAmbiguous(usize, String),
    #[fail(display = "no stock image matched the expected naming pattern")]
    StockImageNotFound,
    #[fail(display = "image '{}' could not be found", _0)]
    ImageNotFound(String),
    #[fail(display = "unable to determine region for subnet '{}'", _0)]
    RegionNotFound(String),
}

impl Fail for VpcError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}
impl Display for VpcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<VpcErrKind> for VpcError {
    fn from(kind: VpcErrKind) -> VpcError {
        VpcError {
            inner: Context::new(kind),
        }
    }
}
impl From<Context<VpcErrKind>> for VpcError {
    fn from(inner: Context<VpcErrKind>) -> VpcError {
        VpcError { inner }
    }
}
