use serde::Deserialize;

/// Host capabilities the fuzzing core depends on.
///
/// The platform decides which shell wraps the target command and which exit
/// statuses count as crashes. It is chosen once at startup and passed in, so
/// the core never sniffs the OS on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Program and arguments that run `command` through the platform shell.
    pub fn shell_invocation<'a>(&self, command: &'a str) -> (&'static str, [&'a str; 2]) {
        match self {
            Platform::Unix => ("sh", ["-c", command]),
            Platform::Windows => ("cmd.exe", ["/c", command]),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Unix => "unix",
            Platform::Windows => "windows",
        }
    }
}

/// Platform as written in configuration, where `auto` defers to the host.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformSetting {
    #[default]
    Auto,
    Unix,
    Windows,
}

impl PlatformSetting {
    pub fn resolve(self) -> Platform {
        match self {
            PlatformSetting::Auto => Platform::host(),
            PlatformSetting::Unix => Platform::Unix,
            PlatformSetting::Windows => Platform::Windows,
        }
    }
}
