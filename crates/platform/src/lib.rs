#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform model and triplet algebra for crossforge
//!
//! A [`Platform`] names a build target: operating system, architecture,
//! the libc/call-ABI part that participates in tool path prefixes, the
//! compiler ABI (libgfortran, libstdc++, C++ string ABI), and a sorted
//! map of free-form extension tags such as `march` or `cuda`.
//!
//! Platforms are immutable values. Canonical string form is the *triplet*
//! (`x86_64-linux-musl-libgfortran5-cxx11-march+avx2`); the *aatriplet*
//! (`x86_64-linux-musl`) is the ABI-agnostic subset used for compiler
//! prefixes inside the sandbox.

mod expand;
mod triplet;

pub use expand::MICROARCHITECTURES;

use crossforge_errors::{Error, PlatformError};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Linux,
    MacOs,
    FreeBsd,
    Windows,
}

impl Os {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::FreeBsd => "freebsd",
            Self::Windows => "windows",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "linux" => Some(Self::Linux),
            "macos" => Some(Self::MacOs),
            "freebsd" => Some(Self::FreeBsd),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

/// Processor architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum Arch {
    I686,
    X86_64,
    Armv7l,
    Aarch64,
    Powerpc64le,
}

impl Arch {
    /// Canonical spelling used in printed triplets. `armv7l` normalises to
    /// `arm`, matching the compiler prefixes the rootfs ships.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Armv7l => "arm",
            Self::Aarch64 => "aarch64",
            Self::Powerpc64le => "powerpc64le",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "i686" => Some(Self::I686),
            "x86_64" => Some(Self::X86_64),
            "arm" | "armv7l" => Some(Self::Armv7l),
            "aarch64" => Some(Self::Aarch64),
            "powerpc64le" => Some(Self::Powerpc64le),
            _ => None,
        }
    }

    /// Pointer width in bits
    #[must_use]
    pub fn wordsize(self) -> u32 {
        match self {
            Self::I686 | Self::Armv7l => 32,
            Self::X86_64 | Self::Aarch64 | Self::Powerpc64le => 64,
        }
    }
}

/// C library flavour (Linux only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Libc {
    Glibc,
    Musl,
}

impl Libc {
    /// Triplet spelling; glibc prints as `gnu`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glibc => "gnu",
            Self::Musl => "musl",
        }
    }
}

/// Calling-convention suffix (armv7l-Linux only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallAbi {
    Eabihf,
}

impl CallAbi {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eabihf => "eabihf",
        }
    }
}

/// C++ string ABI selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CxxStringAbi {
    Cxx03,
    Cxx11,
}

impl CxxStringAbi {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cxx03 => "cxx03",
            Self::Cxx11 => "cxx11",
        }
    }
}

/// Compiler ABI constraints a platform imposes on its toolchain
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompilerAbi {
    pub libgfortran_version: Option<Version>,
    pub libstdcxx_version: Option<Version>,
    pub cxxstring_abi: Option<CxxStringAbi>,
}

impl CompilerAbi {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libgfortran_version.is_none()
            && self.libstdcxx_version.is_none()
            && self.cxxstring_abi.is_none()
    }
}

/// A fully specified (non-`any`) platform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPlatform {
    os: Os,
    arch: Arch,
    libc: Option<Libc>,
    call_abi: Option<CallAbi>,
    abi: CompilerAbi,
    extensions: BTreeMap<String, String>,
}

impl TargetPlatform {
    /// Linux platform; armv7l implies the `eabihf` call ABI
    #[must_use]
    pub fn linux(arch: Arch, libc: Libc) -> Self {
        let call_abi = (arch == Arch::Armv7l).then_some(CallAbi::Eabihf);
        Self {
            os: Os::Linux,
            arch,
            libc: Some(libc),
            call_abi,
            abi: CompilerAbi::default(),
            extensions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn macos(arch: Arch) -> Self {
        Self::bare(Os::MacOs, arch)
    }

    #[must_use]
    pub fn freebsd(arch: Arch) -> Self {
        Self::bare(Os::FreeBsd, arch)
    }

    #[must_use]
    pub fn windows(arch: Arch) -> Self {
        Self::bare(Os::Windows, arch)
    }

    fn bare(os: Os, arch: Arch) -> Self {
        Self {
            os,
            arch,
            libc: None,
            call_abi: None,
            abi: CompilerAbi::default(),
            extensions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn os(&self) -> Os {
        self.os
    }

    #[must_use]
    pub fn arch(&self) -> Arch {
        self.arch
    }

    #[must_use]
    pub fn libc(&self) -> Option<Libc> {
        self.libc
    }

    #[must_use]
    pub fn call_abi(&self) -> Option<CallAbi> {
        self.call_abi
    }

    #[must_use]
    pub fn abi(&self) -> &CompilerAbi {
        &self.abi
    }

    #[must_use]
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    /// The `march` extension, if any
    #[must_use]
    pub fn march(&self) -> Option<&str> {
        self.extensions.get("march").map(String::as_str)
    }

    /// Full triplet: aatriplet plus ABI tags plus sorted `key+value` pairs
    #[must_use]
    pub fn triplet(&self) -> String {
        triplet::print(self)
    }

    /// ABI-agnostic triplet (`arch-os[-libc]`), used for tool path prefixes
    #[must_use]
    pub fn aatriplet(&self) -> String {
        triplet::print_aa(self)
    }

    /// Strip compiler ABI and extensions, keeping the aatriplet part
    #[must_use]
    pub fn abi_agnostic(&self) -> Self {
        Self {
            os: self.os,
            arch: self.arch,
            libc: self.libc,
            call_abi: self.call_abi,
            abi: CompilerAbi::default(),
            extensions: BTreeMap::new(),
        }
    }

    /// Return a copy with the libgfortran constraint replaced
    #[must_use]
    pub fn with_libgfortran_version(&self, version: Option<Version>) -> Self {
        let mut p = self.clone();
        p.abi.libgfortran_version = version;
        p
    }

    /// Return a copy with the libstdc++ constraint replaced
    #[must_use]
    pub fn with_libstdcxx_version(&self, version: Option<Version>) -> Self {
        let mut p = self.clone();
        p.abi.libstdcxx_version = version;
        p
    }

    /// Return a copy with the C++ string ABI replaced
    #[must_use]
    pub fn with_cxxstring_abi(&self, abi: Option<CxxStringAbi>) -> Self {
        let mut p = self.clone();
        p.abi.cxxstring_abi = abi;
        p
    }

    /// Return a copy carrying an additional extension tag
    ///
    /// Setting a key to the value it already has is idempotent; setting it
    /// to a different value is a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidKey`] on malformed keys or values,
    /// unknown `march` values, or conflicting re-sets.
    pub fn with_extension(&self, key: &str, value: &str) -> Result<Self, Error> {
        triplet::validate_extension(key, value)?;
        if key == "march" && !expand::march_known(self.arch, value) {
            return Err(PlatformError::UnknownMicroarchitecture {
                arch: self.arch.as_str().to_string(),
                march: value.to_string(),
            }
            .into());
        }
        if let Some(existing) = self.extensions.get(key) {
            if existing.as_str() != value {
                return Err(PlatformError::InvalidKey {
                    key: key.to_string(),
                    message: format!("already set to {existing}, refusing {value}"),
                }
                .into());
            }
            return Ok(self.clone());
        }

        let mut p = self.clone();
        p.extensions.insert(key.to_string(), value.to_string());
        Ok(p)
    }

    /// Field-wise agreement: every field specified on both sides must
    /// match; a field specified on only one side never forces a mismatch.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        if self.os != other.os || self.arch != other.arch {
            return false;
        }
        if both_disagree(self.libc, other.libc) || both_disagree(self.call_abi, other.call_abi) {
            return false;
        }
        if both_disagree(
            self.abi.libgfortran_version.as_ref(),
            other.abi.libgfortran_version.as_ref(),
        ) || both_disagree(
            self.abi.libstdcxx_version.as_ref(),
            other.abi.libstdcxx_version.as_ref(),
        ) || both_disagree(self.abi.cxxstring_abi, other.abi.cxxstring_abi)
        {
            return false;
        }
        self.extensions.iter().all(|(key, value)| {
            other.extensions.get(key).is_none_or(|v| v == value)
        })
    }
}

fn both_disagree<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triplet())
    }
}

/// A platform descriptor: either a concrete target or the `any` wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Matches every platform; prints as `any`. In build-environment
    /// contexts it behaves exactly like x86_64-linux-musl.
    Any,
    Target(TargetPlatform),
}

impl Platform {
    /// Parse a triplet string
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidTriplet`] on unparseable input.
    pub fn parse(input: &str) -> Result<Self, Error> {
        if input == "any" {
            return Ok(Self::Any);
        }
        triplet::parse(input).map(Self::Target)
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    #[must_use]
    pub fn triplet(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Target(p) => p.triplet(),
        }
    }

    #[must_use]
    pub fn aatriplet(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Target(p) => p.aatriplet(),
        }
    }

    /// The concrete platform every build environment runs as
    #[must_use]
    pub fn build_envify(&self) -> TargetPlatform {
        match self {
            Self::Any => TargetPlatform::linux(Arch::X86_64, Libc::Musl),
            Self::Target(p) => p.clone(),
        }
    }

    #[must_use]
    pub fn abi_agnostic(&self) -> Self {
        match self {
            Self::Any => Self::Any,
            Self::Target(p) => Self::Target(p.abi_agnostic()),
        }
    }

    /// `any` matches everything; concrete platforms match field-wise
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Target(a), Self::Target(b)) => a.matches(b),
        }
    }
}

impl From<TargetPlatform> for Platform {
    fn from(p: TargetPlatform) -> Self {
        Self::Target(p)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triplet())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Platform {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.triplet())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

pub use expand::{
    expand_cxxstring_abis, expand_gfortran_versions, expand_microarchitectures,
    extended_platform_key_abi,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn musl64() -> TargetPlatform {
        TargetPlatform::linux(Arch::X86_64, Libc::Musl)
    }

    #[test]
    fn match_is_reflexive_and_symmetric() {
        let a = Platform::Target(
            musl64()
                .with_cxxstring_abi(Some(CxxStringAbi::Cxx11))
                .with_extension("march", "avx")
                .unwrap(),
        );
        let b = Platform::Target(musl64());

        assert!(a.matches(&a));
        assert!(b.matches(&b));
        assert_eq!(a.matches(&b), b.matches(&a));
        assert!(a.matches(&b));
    }

    #[test]
    fn any_matches_everything() {
        let p = Platform::Target(TargetPlatform::windows(Arch::I686));
        assert!(Platform::Any.matches(&p));
        assert!(p.matches(&Platform::Any));
        assert!(Platform::Any.matches(&Platform::Any));
    }

    #[test]
    fn unshared_fields_never_force_mismatch() {
        // MacOS/x86_64+cxx11 vs MacOS/x86_64+march=avx512: no shared
        // optional field, so they match.
        let a = TargetPlatform::macos(Arch::X86_64).with_cxxstring_abi(Some(CxxStringAbi::Cxx11));
        let b = TargetPlatform::macos(Arch::X86_64)
            .with_extension("march", "avx512")
            .unwrap();
        assert!(a.matches(&b));

        // Same arch key on both sides with different values: mismatch.
        let c = TargetPlatform::windows(Arch::X86_64)
            .with_extension("march", "avx")
            .unwrap();
        let d = TargetPlatform::windows(Arch::I686);
        assert!(!c.matches(&d));
    }

    #[test]
    fn extension_set_is_idempotent_but_conflicts_fail() {
        let p = musl64().with_extension("cuda", "9.2").unwrap();
        let again = p.with_extension("cuda", "9.2").unwrap();
        assert_eq!(p, again);
        assert!(p.with_extension("cuda", "10.1").is_err());
    }

    #[test]
    fn plus_in_extension_is_rejected() {
        assert!(musl64().with_extension("cuda", "9+2").is_err());
        assert!(musl64().with_extension("cu+da", "9.2").is_err());
    }

    #[test]
    fn unknown_march_is_rejected() {
        assert!(musl64().with_extension("march", "pentium4").is_err());
        assert!(TargetPlatform::linux(Arch::Aarch64, Libc::Glibc)
            .with_extension("march", "avx")
            .is_err());
    }

    #[test]
    fn any_build_envifies_to_musl64() {
        assert_eq!(Platform::Any.build_envify(), musl64());
        assert_eq!(Platform::Any.triplet(), "any");
    }

    #[test]
    fn abi_agnostic_strips_tags() {
        let p = musl64()
            .with_libgfortran_version(Some(Version::new(5, 0, 0)))
            .with_extension("march", "avx2")
            .unwrap();
        assert_eq!(p.abi_agnostic(), musl64());
        assert_eq!(p.aatriplet(), "x86_64-linux-musl");
    }

    #[test]
    fn serde_round_trips_through_triplet() {
        let p = Platform::Target(
            musl64()
                .with_libgfortran_version(Some(Version::new(5, 0, 0)))
                .with_extension("cuda", "9.2")
                .unwrap(),
        );
        let json = serde_json::to_string(&p).unwrap();
        let back: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
