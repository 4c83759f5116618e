//! Triplet wire format: printing and parsing
//!
//! `<arch>-<os>[-<libc>][eabihf][-libgfortranN][-cxxNN][-<key>+<value>]...`
//! with key/value pairs sorted lexicographically. `parse` is the exact
//! inverse of `print` for every valid platform.

use crate::{Arch, CallAbi, CompilerAbi, CxxStringAbi, Libc, Os, TargetPlatform};
use crossforge_errors::{Error, PlatformError};
use semver::Version;
use std::collections::BTreeMap;

pub(crate) fn print(p: &TargetPlatform) -> String {
    let mut out = print_aa(p);

    if let Some(v) = &p.abi().libgfortran_version {
        out.push_str(&format!("-libgfortran{}", v.major));
    }
    if let Some(abi) = p.abi().cxxstring_abi {
        out.push('-');
        out.push_str(abi.as_str());
    }

    // libstdc++ joins the sorted key+value section under a reserved key.
    let mut pairs: BTreeMap<&str, String> = p
        .extensions()
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    if let Some(v) = &p.abi().libstdcxx_version {
        pairs.insert("libstdcxx", v.to_string());
    }
    for (key, value) in pairs {
        out.push_str(&format!("-{key}+{value}"));
    }

    out
}

pub(crate) fn print_aa(p: &TargetPlatform) -> String {
    let mut out = format!("{}-{}", p.arch().as_str(), p.os().as_str());
    if let Some(libc) = p.libc() {
        out.push('-');
        out.push_str(libc.as_str());
        if let Some(call_abi) = p.call_abi() {
            out.push_str(call_abi.as_str());
        }
    }
    out
}

pub(crate) fn parse(input: &str) -> Result<TargetPlatform, Error> {
    let invalid = || -> Error {
        PlatformError::InvalidTriplet {
            input: input.to_string(),
        }
        .into()
    };

    let tokens: Vec<&str> = input.split('-').collect();
    if tokens.len() < 2 {
        return Err(invalid());
    }

    let arch = Arch::parse(tokens[0]).ok_or_else(invalid)?;
    let os = Os::parse(tokens[1]).ok_or_else(invalid)?;

    let (libc, call_abi, mut rest) = if os == Os::Linux {
        let token = tokens.get(2).ok_or_else(invalid)?;
        let (libc, call_abi) = match *token {
            "gnu" => (Libc::Glibc, None),
            "musl" => (Libc::Musl, None),
            "gnueabihf" => (Libc::Glibc, Some(CallAbi::Eabihf)),
            "musleabihf" => (Libc::Musl, Some(CallAbi::Eabihf)),
            _ => return Err(invalid()),
        };
        // eabihf goes with armv7l and nothing else
        if (call_abi.is_some()) != (arch == Arch::Armv7l) {
            return Err(invalid());
        }
        (Some(libc), call_abi, &tokens[3..])
    } else {
        (None, None, &tokens[2..])
    };

    let mut abi = CompilerAbi::default();
    let mut extensions = BTreeMap::new();

    while let Some(&tag) = rest.first() {
        rest = &rest[1..];

        if let Some((key, value)) = tag.split_once('+') {
            if key == "libstdcxx" {
                if abi.libstdcxx_version.is_some() {
                    return Err(invalid());
                }
                abi.libstdcxx_version = Some(Version::parse(value).map_err(|_| invalid())?);
            } else {
                validate_extension(key, value).map_err(|_| invalid())?;
                if key == "march" && !crate::expand::march_known(arch, value) {
                    return Err(invalid());
                }
                if extensions.insert(key.to_string(), value.to_string()).is_some() {
                    return Err(invalid());
                }
            }
        } else if let Some(digits) = tag.strip_prefix("libgfortran") {
            if abi.libgfortran_version.is_some() {
                return Err(invalid());
            }
            let major: u64 = digits.parse().map_err(|_| invalid())?;
            abi.libgfortran_version = Some(Version::new(major, 0, 0));
        } else if let Some(cxx) = parse_cxxstring(tag) {
            if abi.cxxstring_abi.is_some() {
                return Err(invalid());
            }
            abi.cxxstring_abi = Some(cxx);
        } else {
            return Err(invalid());
        }
    }

    Ok(TargetPlatform {
        os,
        arch,
        libc,
        call_abi,
        abi,
        extensions,
    })
}

fn parse_cxxstring(tag: &str) -> Option<CxxStringAbi> {
    match tag {
        "cxx03" => Some(CxxStringAbi::Cxx03),
        "cxx11" => Some(CxxStringAbi::Cxx11),
        _ => None,
    }
}

/// Keys are lowercase identifiers; values are alphanumeric-with-dots.
/// Anything that would collide with the tag grammar is reserved.
pub(crate) fn validate_extension(key: &str, value: &str) -> Result<(), Error> {
    let invalid_key = |message: String| -> Error {
        PlatformError::InvalidKey {
            key: key.to_string(),
            message,
        }
        .into()
    };

    let mut chars = key.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if !head_ok || !key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(invalid_key("keys are lowercase identifiers".to_string()));
    }

    if key == "libstdcxx"
        || parse_cxxstring(key).is_some()
        || key
            .strip_prefix("libgfortran")
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid_key("key is reserved for ABI tags".to_string()));
    }

    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(invalid_key(format!(
            "value {value} must be non-empty alphanumeric (`+` is the pair separator)"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{Arch, CxxStringAbi, Libc, Platform, TargetPlatform};
    use semver::Version;

    #[track_caller]
    fn round_trip(s: &str) {
        let p = Platform::parse(s).unwrap();
        assert_eq!(p.triplet(), s);
        assert_eq!(Platform::parse(&p.triplet()).unwrap(), p);
    }

    #[test]
    fn parse_is_inverse_of_print() {
        round_trip("x86_64-linux-musl");
        round_trip("i686-linux-gnu");
        round_trip("arm-linux-gnueabihf");
        round_trip("aarch64-macos");
        round_trip("powerpc64le-linux-gnu-libgfortran3");
        round_trip("x86_64-freebsd-cxx11");
        round_trip("x86_64-linux-gnu-libgfortran5-cxx11-libstdcxx+3.4.26-march+avx2");
        round_trip("any");
    }

    #[test]
    fn extended_triplet_parses_to_expected_platform() {
        let p = Platform::parse("x86_64-linux-musl-cuda+9.2-march+avx").unwrap();
        let expected = TargetPlatform::linux(Arch::X86_64, Libc::Musl)
            .with_extension("cuda", "9.2")
            .unwrap()
            .with_extension("march", "avx")
            .unwrap();
        assert_eq!(p, Platform::Target(expected));
        assert_eq!(p.triplet(), "x86_64-linux-musl-cuda+9.2-march+avx");
    }

    #[test]
    fn armv7l_spelling_is_accepted_and_normalised() {
        let p = Platform::parse("armv7l-linux-gnueabihf").unwrap();
        assert_eq!(p.triplet(), "arm-linux-gnueabihf");
        assert_eq!(
            p,
            Platform::Target(TargetPlatform::linux(Arch::Armv7l, Libc::Glibc))
        );
    }

    #[test]
    fn abi_tags_parse_into_the_abi_record() {
        let p = Platform::parse("x86_64-linux-gnu-libgfortran4-cxx03").unwrap();
        let Platform::Target(t) = p else { panic!() };
        assert_eq!(t.abi().libgfortran_version, Some(Version::new(4, 0, 0)));
        assert_eq!(t.abi().cxxstring_abi, Some(CxxStringAbi::Cxx03));
    }

    #[test]
    fn malformed_triplets_are_rejected()  {
        for bad in [
            "",
            "x86_64",
            "x86_64-linux",            // linux needs a libc
            "x86_64-linux-gnueabihf",  // eabihf is armv7l-only
            "arm-linux-gnu",           // armv7l needs eabihf
            "x86_64-plan9",
            "mips-linux-gnu",
            "x86_64-linux-musl-bogus",
            "x86_64-linux-musl-march+pentium4",
            "x86_64-linux-musl-cuda+9.2-cuda+10.0",
        ] {
            assert!(Platform::parse(bad).is_err(), "{bad} should not parse");
        }
    }
}
