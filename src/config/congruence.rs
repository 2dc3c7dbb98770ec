use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::congruence::{CongruenceAnalysis, CongruenceAnalysisGroup, Restriction};
use crate::error::ConfigError;

/// Two project files and the groups compared between them.
#[derive(Clone, Debug, Deserialize)]
pub struct CongruenceConfig {
    /// Project of the first epoch; relative paths start at the config file.
    pub first: PathBuf,
    pub second: PathBuf,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub dimension: usize,
    /// Tested only.
    #[serde(default)]
    pub common: Vec<String>,
    /// Tested and used for the strain fit.
    #[serde(default)]
    pub analysable: Vec<String>,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
}

pub fn load_config(path: &Path) -> Result<CongruenceConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: CongruenceConfig =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    if let Some(base) = path.parent() {
        config.first = base.join(&config.first);
        config.second = base.join(&config.second);
    }
    Ok(config)
}

impl GroupConfig {
    /// Builds the group; without listed points every common ID is analysable.
    pub fn group(&self, analysis: &CongruenceAnalysis) -> Result<CongruenceAnalysisGroup, ConfigError> {
        let mut group = CongruenceAnalysisGroup::new(&self.id, self.dimension)?;
        for restriction in &self.restrictions {
            group.add_restriction(*restriction)?;
        }

        let all;
        let analysable = if self.common.is_empty() && self.analysable.is_empty() {
            all = analysis.common_ids();
            &all
        } else {
            &self.analysable
        };
        for (ids, strain) in [(analysable, true), (&self.common, false)] {
            for id in ids {
                let pair = analysis.point_pair(id, group.dimension())?;
                if !group.add(pair, strain) {
                    return Err(ConfigError::DuplicatePoint(id.clone()));
                }
            }
        }
        Ok(group)
    }
}

impl CongruenceConfig {
    pub fn apply(&self, analysis: &mut CongruenceAnalysis) -> Result<(), ConfigError> {
        for config in &self.groups {
            let group = config.group(analysis)?;
            analysis.add_group(group)?;
        }
        Ok(())
    }
}
