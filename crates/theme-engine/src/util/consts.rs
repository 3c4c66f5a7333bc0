pub mod env_var {
    macro_rules! define_env_vars {
        ($($(#[$meta:meta])* $ident:ident = $name:expr),*) => {
            $(
                $(#[$meta])*
                pub const $ident: &str = $name;
            )*

            pub const ALL: &[&str] = &[$($ident),*];
        }
    }

    define_env_vars! {
        /// Path to an engine config file
        ///
        /// Used when `--config` is not passed on the command line
        THEME_ENGINE_CONFIG = "THEME_ENGINE_CONFIG",

        /// Directory the log file is written to
        THEME_ENGINE_LOG_DIR = "THEME_ENGINE_LOG_DIR"
    }
}

/// File name of the log written by the binary.
pub const LOG_FILE_NAME: &str = "theme-engine.log";
