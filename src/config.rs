//! Configuration management for the OCR server

use std::env;

use crate::ocr::DEFAULT_LANGUAGE;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Language combination used when a request omits one
    pub default_language: String,
    /// Directory containing `.traineddata` files; `None` uses the
    /// Tesseract build's default search path
    pub tessdata_path: Option<String>,
    /// How long shutdown waits for in-flight recognitions to drain
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            ocr: OcrConfig {
                default_language: DEFAULT_LANGUAGE.to_string(),
                tessdata_path: None,
                shutdown_grace_secs: 10,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            ocr: OcrConfig {
                default_language: env::var("OCR_DEFAULT_LANGUAGE")
                    .unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string()),
                tessdata_path: env::var("TESSDATA_PATH").ok(),
                shutdown_grace_secs: env::var("OCR_SHUTDOWN_GRACE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
        }
    }
}
