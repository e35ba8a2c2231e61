/// version.rs — Engine/strategy version compatibility (C11)
///
/// A strategy built against one engine version may be loaded by a newer
/// (or older) engine build; compatibility is major.minor equality, patch
/// is free to differ. `"main"` on either side always succeeds — that's
/// the tag used for in-development builds that haven't cut a release.
use crate::error::{EngineError, ErrorCode, Result};

/// Fails fatally when `engine` and `strategy` disagree on major or minor
/// version.
pub fn check_compatibility(engine: &str, strategy: &str) -> Result<()> {
    let e = engine.strip_prefix('v').unwrap_or(engine);
    let s = strategy.strip_prefix('v').unwrap_or(strategy);

    if e == "main" || s == "main" {
        return Ok(());
    }

    let ev = parse(e, "engine")?;
    let sv = parse(s, "strategy")?;

    if ev.major != sv.major {
        return Err(mismatch(e, s, "major"));
    }
    if ev.minor != sv.minor {
        return Err(mismatch(e, s, "minor"));
    }
    Ok(())
}

fn parse(version: &str, which: &str) -> Result<semver::Version> {
    semver::Version::parse(version).map_err(|err| EngineError::VersionMismatch {
        code: ErrorCode::VersionMismatch,
        message: format!("{which} version `{version}` is not valid semver: {err}"),
    })
}

fn mismatch(engine: &str, strategy: &str, component: &str) -> EngineError {
    EngineError::VersionMismatch {
        code: ErrorCode::VersionMismatch,
        message: format!(
            "engine `{engine}` and strategy `{strategy}` disagree on {component} version"
        ),
    }
}
