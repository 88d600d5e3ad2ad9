//! Channels
//!
//! A channel is a named image stream shown in its own viewer. Names are
//! unique and case-sensitive, creation order is kept, and once any channel
//! exists exactly one of them is active.

use std::collections::VecDeque;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("no channel named '{0}'")]
    NotFound(String),

    #[error("channel names cannot be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub name: String,
    pub active: bool,
    /// Workspace hosting this channel's viewer
    pub workspace: String,
    /// How many images the channel keeps before evicting the oldest
    pub num_images: usize,
    pub images: VecDeque<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>, workspace: impl Into<String>, num_images: usize) -> Self {
        Self {
            name: name.into(),
            active: false,
            workspace: workspace.into(),
            num_images: num_images.max(1),
            images: VecDeque::new(),
        }
    }

    /// Add a loaded image; returns the evicted one, if any.
    pub fn add_image(&mut self, image: impl Into<String>) -> Option<String> {
        self.images.push_back(image.into());
        if self.images.len() > self.num_images {
            self.images.pop_front()
        } else {
            None
        }
    }

    pub fn current_image(&self) -> Option<&str> {
        self.images.back().map(String::as_str)
    }
}

/// Settings applied to newly created channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Prefix for automatically named channels and the default channel
    pub prefix: String,
    pub workspace: String,
    pub num_images: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            prefix: "Image".to_string(),
            workspace: "channels".to_string(),
            num_images: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelManager {
    config: ChannelConfig,
    channels: Vec<Channel>,
    active: Option<usize>,
    counter: usize,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Create a channel in the configured workspace.
    ///
    /// Returns `Ok(false)` if the channel already exists. The first channel
    /// ever created becomes active.
    pub fn create(&mut self, name: &str) -> Result<bool, ChannelError> {
        let workspace = self.config.workspace.clone();
        self.create_in(name, &workspace)
    }

    pub fn create_in(&mut self, name: &str, workspace: &str) -> Result<bool, ChannelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChannelError::EmptyName);
        }
        if self.contains(name) {
            return Ok(false);
        }

        tracing::debug!("Adding channel '{}' in '{}'", name, workspace);
        let mut channel = Channel::new(name, workspace, self.config.num_images);
        if self.active.is_none() {
            channel.active = true;
            self.active = Some(self.channels.len());
        }
        self.channels.push(channel);
        Ok(true)
    }

    /// Create a channel named prefix + counter, skipping names already taken.
    pub fn auto_create(&mut self) -> String {
        loop {
            let name = format!("{}{}", self.config.prefix, self.counter);
            self.counter += 1;
            if !self.contains(&name) {
                let workspace = self.config.workspace.clone();
                // Non-empty and unused, so creation always succeeds
                let _ = self.create_in(&name, &workspace);
                return name;
            }
        }
    }

    /// Make `name` the active channel. Returns whether the active channel
    /// changed.
    pub fn activate(&mut self, name: &str) -> Result<bool, ChannelError> {
        let pos = self
            .position(name)
            .ok_or_else(|| ChannelError::NotFound(name.to_string()))?;
        if self.active == Some(pos) {
            return Ok(false);
        }

        if let Some(old) = self.active {
            self.channels[old].active = false;
        }
        self.channels[pos].active = true;
        self.active = Some(pos);
        tracing::debug!("Active channel is now '{}'", name);
        Ok(true)
    }

    /// Remove a channel. If it was active, its neighbour takes over.
    pub fn delete(&mut self, name: &str) -> Result<Channel, ChannelError> {
        let pos = self
            .position(name)
            .ok_or_else(|| ChannelError::NotFound(name.to_string()))?;
        let removed = self.channels.remove(pos);

        let current = self.active;
        self.active = match current {
            _ if self.channels.is_empty() => None,
            Some(active) if active == pos => {
                let next = pos.min(self.channels.len() - 1);
                self.channels[next].active = true;
                Some(next)
            }
            Some(active) if active > pos => Some(active - 1),
            other => other,
        };
        Ok(removed)
    }

    /// Create the default channel (named after the prefix) if there are none.
    pub fn ensure_default(&mut self) -> Option<String> {
        if !self.channels.is_empty() {
            return None;
        }
        let name = self.config.prefix.clone();
        match self.create(&name) {
            Ok(_) => Some(name),
            Err(_) => Some(self.auto_create()),
        }
    }

    /// Pair files with the channels they load into.
    ///
    /// With `separate`, file *i* goes to the *i*-th channel in creation
    /// order, creating channels once the existing ones run out. Otherwise
    /// every file goes to the active channel.
    pub fn assign<S: AsRef<str>>(&mut self, files: &[S], separate: bool) -> Vec<(String, String)> {
        if files.is_empty() {
            return Vec::new();
        }
        self.ensure_default();

        let mut assignments = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            let channel = if separate {
                match self.channels.get(i) {
                    Some(channel) => channel.name.clone(),
                    None => self.auto_create(),
                }
            } else {
                self.active_name().unwrap_or_default().to_string()
            };
            assignments.push((file.as_ref().to_string(), channel));
        }
        assignments
    }

    pub fn active(&self) -> Option<&Channel> {
        self.active.map(|pos| &self.channels[pos])
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.position(name).map(|pos| &self.channels[pos])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.position(name).map(move |pos| &mut self.channels[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Channel names in creation order.
    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Channel after the active one, wrapping around.
    pub fn next_name(&self) -> Option<&str> {
        let pos = self.active?;
        let next = (pos + 1) % self.channels.len();
        Some(&self.channels[next].name)
    }

    /// Channel before the active one, wrapping around.
    pub fn prev_name(&self) -> Option<&str> {
        let pos = self.active?;
        let prev = (pos + self.channels.len() - 1) % self.channels.len();
        Some(&self.channels[prev].name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }
}
