//! Closed scope vocabulary and the canonical scope set used on the wire.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Raised when a scope string falls outside the known vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Scope `{scope}` is not recognized.")]
pub struct UnrecognizedScope {
	/// The offending wire token.
	pub scope: String,
}

macro_rules! scopes {
	($($(#[$doc:meta])* $variant:ident => $wire:literal,)+) => {
		/// A permission the resource owner can grant to the application.
		///
		/// Variants are declared in the lexical order of their wire names so the derived
		/// [`Ord`] matches the canonical serialization order.
		#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub enum Scope {
			$($(#[$doc])* $variant,)+
		}
		impl Scope {
			/// Every known scope, in canonical order.
			pub const ALL: &'static [Scope] = &[$(Scope::$variant,)+];

			/// Returns the wire identifier.
			pub const fn as_str(self) -> &'static str {
				match self {
					$(Scope::$variant => $wire,)+
				}
			}
		}
		impl FromStr for Scope {
			type Err = UnrecognizedScope;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s {
					$($wire => Ok(Scope::$variant),)+
					_ => Err(UnrecognizedScope { scope: s.to_owned() }),
				}
			}
		}
	};
}

scopes! {
	/// Remote control playback of the Spotify app on iOS and Android.
	AppRemoteControl => "app-remote-control",
	/// Manage private playlists.
	PlaylistModifyPrivate => "playlist-modify-private",
	/// Manage public playlists.
	PlaylistModifyPublic => "playlist-modify-public",
	/// Include collaborative playlists when listing playlists.
	PlaylistReadCollaborative => "playlist-read-collaborative",
	/// Read private playlists.
	PlaylistReadPrivate => "playlist-read-private",
	/// Play content in the Web Playback SDK.
	Streaming => "streaming",
	/// Upload custom playlist cover images.
	UgcImageUpload => "ugc-image-upload",
	/// Manage followed artists and users.
	UserFollowModify => "user-follow-modify",
	/// Read followed artists and users.
	UserFollowRead => "user-follow-read",
	/// Manage saved content.
	UserLibraryModify => "user-library-modify",
	/// Read saved content.
	UserLibraryRead => "user-library-read",
	/// Control playback.
	UserModifyPlaybackState => "user-modify-playback-state",
	/// Read the currently playing content.
	UserReadCurrentlyPlaying => "user-read-currently-playing",
	/// Read the account email address.
	UserReadEmail => "user-read-email",
	/// Read playback position in episodes.
	UserReadPlaybackPosition => "user-read-playback-position",
	/// Read playback state.
	UserReadPlaybackState => "user-read-playback-state",
	/// Read subscription details.
	UserReadPrivate => "user-read-private",
	/// Read recently played items.
	UserReadRecentlyPlayed => "user-read-recently-played",
	/// Read top artists and tracks.
	UserTopRead => "user-top-read",
}

impl Display for Scope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Deduplicated, canonically ordered set of [`Scope`] values.
///
/// The wire form is space-delimited and sorted, so [`ScopeSet::format`] is stable for equal
/// sets and `parse(format(s)) == s` always holds.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(BTreeSet<Scope>);
impl ScopeSet {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set containing every known scope.
	pub fn all() -> Self {
		Self::from_iter(Scope::ALL.iter().copied())
	}

	/// Parses a whitespace-delimited wire string, rejecting unknown entries.
	pub fn parse(wire: &str) -> Result<Self, UnrecognizedScope> {
		wire.split_whitespace().map(Scope::from_str).collect()
	}

	/// Renders the canonical wire string.
	pub fn format(&self) -> String {
		self.iter().map(Scope::as_str).collect::<Vec<_>>().join(" ")
	}

	/// Plain subset test: `true` when every `required` scope is in `granted`.
	pub fn is_sufficient(required: &ScopeSet, granted: &ScopeSet) -> bool {
		required.0.is_subset(&granted.0)
	}

	/// Adds a scope, returning `true` if it was not yet present.
	pub fn insert(&mut self, scope: Scope) -> bool {
		self.0.insert(scope)
	}

	/// Returns true if the set contains `scope`.
	pub fn contains(&self, scope: Scope) -> bool {
		self.0.contains(&scope)
	}

	/// Number of scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates in canonical order.
	pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
		self.0.iter().copied()
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.iter().map(Scope::as_str)).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.format())
	}
}
impl FromStr for ScopeSet {
	type Err = UnrecognizedScope;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl FromIterator<Scope> for ScopeSet {
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = Scope>,
	{
		Self(iter.into_iter().collect())
	}
}
impl<const N: usize> From<[Scope; N]> for ScopeSet {
	fn from(value: [Scope; N]) -> Self {
		Self::from_iter(value)
	}
}
impl Extend<Scope> for ScopeSet {
	fn extend<I>(&mut self, iter: I)
	where
		I: IntoIterator<Item = Scope>,
	{
		self.0.extend(iter);
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.format())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let wire = <String>::deserialize(deserializer)?;

		ScopeSet::parse(&wire).map_err(DeError::custom)
	}
}
