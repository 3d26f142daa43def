use arcstr::ArcStr;

/// Strng is a cheaply-cloneable string for the mostly-immutable identifiers
/// (workload uids, service names) this process shuffles around constantly.
pub type Strng = ArcStr;

pub use arcstr::format;
pub use arcstr::literal;

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	s.as_ref().into()
}
