use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    /// Running inside Termux on the device itself.
    Android,
    Desktop,
}

impl HostPlatform {
    pub fn detect() -> Self {
        if cfg!(target_os = "android") {
            HostPlatform::Android
        } else {
            HostPlatform::Desktop
        }
    }

    pub fn is_android(&self) -> bool {
        matches!(self, HostPlatform::Android)
    }

    pub fn jdk_install_hint(&self) -> &'static str {
        match self {
            HostPlatform::Android => {
                "You don't have JDK installed. Please close Builder and install it using: `pkg install openjdk-17`"
            }
            HostPlatform::Desktop => {
                "You don't have JDK installed. Please install JDK 17 and make sure `java` is on your PATH."
            }
        }
    }
}

/// ABI directory inside the aapt2 bundle for a Rust target arch.
pub fn android_abi_dir(arch: &str) -> Option<&'static str> {
    match arch {
        "aarch64" => Some("arm64-v8a"),
        "arm" => Some("armeabi-v7a"),
        _ => None,
    }
}

pub const AAPT2_BUNDLE_DIRS: [&str; 3] = ["arm64-v8a", "armeabi-v7a", "x86"];
