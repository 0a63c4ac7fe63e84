use std::path::Path;

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Resolves a configured tool command, falling back to the bare name on PATH.
pub fn resolve_program(config_command_path: &str, fallback: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        fallback.to_string()
    } else {
        normalized
    }
}

/// Bare names are looked up on PATH at spawn time; explicit paths must exist.
pub fn validate_program(program: &str, label: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err(format!("{label} command is empty"));
    }
    let path = Path::new(program);
    if path.components().count() == 1 {
        return Ok(());
    }
    if path.is_dir() {
        return Err(format!("{label} path must point to an executable file"));
    }
    if !path.exists() {
        return Err(format!("{label} executable not found at the configured path"));
    }
    Ok(())
}
