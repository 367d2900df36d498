use crate::error::Trap;
use crate::model::Value;

/// Native callable bound to a declared signature by [`super::HostModule`].
///
/// Arguments arrive already checked against the declared parameter types. The returned value
/// must match the declared result (at most one); a mismatch is reported as [`Trap::Host`].
pub type HostFunc = dyn Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync;
