use crate::domain::config::{DeviceConfig, GlobalConfig, QuickCommand, SppComConfig, TransportConfig};
use crate::domain::error::{SppComError, SppComResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR: &str = ".sppcom";
const CONFIG_FILE: &str = "config.toml";

/// Project files contribute devices and, optionally, their own quick commands
#[derive(Debug, Deserialize)]
struct ProjectConfig {
    #[serde(default)]
    devices: Vec<DeviceConfig>,
    #[serde(default)]
    commands: Option<Vec<QuickCommand>>,
}

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> SppComResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_project_config_path(&dir));

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Manager rooted at explicit paths
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration from files.
    ///
    /// Global settings and devices come from the global file; project
    /// devices are appended and project quick commands replace the global
    /// ones when present.
    pub fn load_config(&self) -> SppComResult<SppComConfig> {
        let mut config = SppComConfig::default();

        if self.global_config_path.exists() {
            config = self.load_config_from_path(&self.global_config_path)?;
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                let content = Self::read(project_path)?;
                let project_config: ProjectConfig =
                    toml::from_str(&content).map_err(|e| SppComError::Config {
                        message: format!("Failed to parse config file {}: {}", project_path.display(), e),
                    })?;
                config.devices.extend(project_config.devices);
                if let Some(commands) = project_config.commands {
                    config.commands = commands;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the global file
    pub fn save_config(&self, config: &SppComConfig) -> SppComResult<()> {
        self.save_config_to_path(&self.global_config_path, config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> SppComResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| SppComError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("sppcom").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    pub fn find_project_config_path(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .find(|path| path.exists())
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> SppComResult<SppComConfig> {
        let content = Self::read(path)?;
        let config = Self::parse(path, &content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &SppComConfig) -> SppComResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SppComError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| SppComError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| SppComError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        debug!("Wrote configuration to {}", path.display());
        Ok(())
    }

    /// Create default project configuration under `path`
    pub fn init_project_config(&self, path: &Path) -> SppComResult<PathBuf> {
        let config_file = path.join(CONFIG_DIR).join(CONFIG_FILE);

        if config_file.exists() {
            return Err(SppComError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        let default_config = SppComConfig {
            global: GlobalConfig::default(),
            devices: vec![
                DeviceConfig {
                    name: "SmartStick".to_string(),
                    description: "ESP32 bound with `rfcomm bind /dev/rfcomm0 <address>`".to_string(),
                    address: "/dev/rfcomm0".to_string(),
                    transport: TransportConfig::default(),
                },
                DeviceConfig {
                    name: "bridge".to_string(),
                    description: "SPP peer behind a TCP bridge".to_string(),
                    address: "192.168.4.1:8888".to_string(),
                    transport: TransportConfig::Tcp,
                },
                DeviceConfig {
                    name: "esp32".to_string(),
                    description: "Connected through BlueZ, paired on first use".to_string(),
                    address: "24:6F:28:00:00:01".to_string(),
                    transport: TransportConfig::Bluetooth { channel: None },
                },
            ],
            ..SppComConfig::default()
        };

        self.save_config_to_path(&config_file, &default_config)?;

        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }

    fn read(path: &Path) -> SppComResult<String> {
        fs::read_to_string(path).map_err(|e| SppComError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })
    }

    fn parse(path: &Path, content: &str) -> SppComResult<SppComConfig> {
        toml::from_str(content).map_err(|e| SppComError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }
}
