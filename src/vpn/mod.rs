//! Tunnel target discovery: hostname resolution and the persisted IP list

pub mod iplist;
pub mod resolve;

pub use iplist::{IpList, IpListError};
pub use resolve::{HostResolver, ResolveError, Resolution};
