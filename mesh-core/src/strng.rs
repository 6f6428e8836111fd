//! A cheap-to-clone string type used for resource names and ids.
//!
//! `Strng` provides better properties than `String` for our use case: cheap
//! cloning (ref counting), compact storage, and immutability. `arcstr`
//! already provides this; the alias exists so call sites say `Strng`
//! instead of spelling out `arcstr::ArcStr` everywhere, and so the
//! underlying implementation can change later without touching call sites.

pub type Strng = arcstr::ArcStr;

pub const EMPTY: Strng = arcstr::literal!("");

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	Strng::from(s.as_ref())
}

pub use arcstr::{format, literal};
