use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::voice::VoiceCommand;

pub type Color = [u8; 3];

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// debounce window length, frames
    pub hold_frames: usize,
    /// swipe history length, frames
    pub swipe_window: usize,
    pub swipe_threshold_px: f32,
    /// all fingertip pairs closer than this x hand scale -> zoom in
    pub zoom_in_ratio: f32,
    /// all fingertip pairs further than this x hand scale -> zoom out
    pub zoom_out_ratio: f32,
    /// absolute, not scaled by hand size
    pub pinch_px: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Style {
    pub draw_color: Color,
    pub draw_thickness: f32,
    pub erase_color: Color,
    pub erase_radius: f32,
    pub highlight_color: Color,
    pub highlight_radius: f32,
    pub highlight_alpha: f32,
    pub laser_color: Color,
    pub laser_radius: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub thresholds: Thresholds,
    pub style: Style,

    // phrase -> action; nested tables are flattened to "group.phrase"
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub voice: HashMap<String, String>,
}

impl Profile {
    /// The bundled default profile.
    pub fn builtin() -> Result<Self> {
        let profile: Profile = toml::from_str(default_profile_text())
            .map_err(|e| anyhow!("failed to parse bundled default profile: {e}"))?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "voice bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "voice binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    home.join(".config").join("handmark")
}

pub fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Re-read the active profile. On error the last good profile stays in place.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let profile = self.check_profile(name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    /// Path of a named profile. Names are plain file stems; anything that
    /// could leave the profiles directory is refused.
    pub fn profile_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(anyhow!("invalid profile name: {name:?}"));
        }
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        Ok(p)
    }

    /// Read and validate a named profile without activating it.
    pub fn check_profile(&self, name: &str) -> Result<Profile> {
        load_profile_file(&self.profile_path(name)?)
    }

    pub fn active_profile_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir().join(format!("{name}.toml"));
        load_profile_file(&path)
    }

    pub fn doctor_report(&self, socket: &Path) -> serde_json::Value {
        let th = &self.profile.thresholds;
        let mut notes = vec![format!(
            "pinch_px={} is absolute pixels; zoom ratios scale with hand size",
            th.pinch_px
        )];
        if th.hold_frames > th.swipe_window {
            notes.push("hold_frames exceeds swipe_window; mode selection lags swipes".to_string());
        }
        serde_json::json!({
            "socket_present": socket.exists(),
            "socket": socket,
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "profiles": self.list_profiles(),
            "active_profile": self.active_name,
            "voice_bindings": self.profile.voice.len(),
            "notes": notes,
        })
    }
}

pub fn load_profile_file(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    let profile: Profile =
        toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
    validate_profile(&profile)?;
    Ok(profile)
}

/// Active profile when one is installed, otherwise the bundled default.
pub fn load_active_or_builtin() -> Result<Profile> {
    let ptr = active_ptr_path();
    let name = match fs::read_to_string(&ptr) {
        Ok(s) => s.trim().to_string(),
        Err(_) => return Profile::builtin(),
    };
    let path = profiles_dir().join(format!("{name}.toml"));
    match load_profile_file(&path) {
        Ok(p) => Ok(p),
        Err(e) => {
            warn!("{e}; falling back to bundled default profile");
            Profile::builtin()
        }
    }
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if th.hold_frames == 0 {
        return Err(anyhow!("thresholds.hold_frames must be at least 1"));
    }
    if th.swipe_window < 2 {
        return Err(anyhow!("thresholds.swipe_window must be at least 2"));
    }
    if th.swipe_threshold_px <= 0.0 || th.pinch_px <= 0.0 {
        return Err(anyhow!("thresholds must be positive pixel distances"));
    }
    if th.zoom_in_ratio <= 0.0 || th.zoom_in_ratio >= th.zoom_out_ratio {
        return Err(anyhow!(
            "thresholds.zoom_in_ratio must be positive and below zoom_out_ratio"
        ));
    }

    let st = &p.style;
    if !(0.0..=1.0).contains(&st.highlight_alpha) {
        return Err(anyhow!("style.highlight_alpha must be in [0,1]"));
    }
    if st.draw_thickness <= 0.0
        || st.erase_radius <= 0.0
        || st.highlight_radius <= 0.0
        || st.laser_radius <= 0.0
    {
        return Err(anyhow!("style sizes must be positive"));
    }

    for (k, v) in &p.voice {
        if k.trim().is_empty() {
            return Err(anyhow!("empty voice phrase"));
        }
        if v.parse::<VoiceCommand>().is_err() {
            return Err(anyhow!("voice phrase '{}' has invalid action '{}'", k, v));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[meta]
name = "test"

[thresholds]
hold_frames = 4
swipe_window = 8
swipe_threshold_px = 60.0
zoom_in_ratio = 0.25
zoom_out_ratio = 0.5
pinch_px = 40.0

[style]
draw_color = [0, 0, 0]
draw_thickness = 6.0
erase_color = [255, 255, 255]
erase_radius = 40.0
highlight_color = [255, 255, 0]
highlight_radius = 25.0
highlight_alpha = 0.4
laser_color = [255, 0, 0]
laser_radius = 8.0
"#;

    #[test]
    fn builtin_profile_is_valid() {
        let p = Profile::builtin().unwrap();
        assert_eq!(p.thresholds.hold_frames, 4);
        assert_eq!(p.thresholds.swipe_window, 8);
        assert!(!p.voice.is_empty());
    }

    #[test]
    fn voice_section_is_optional() {
        let p: Profile = toml::from_str(MINIMAL).unwrap();
        assert!(p.voice.is_empty());
        validate_profile(&p).unwrap();
    }

    #[test]
    fn nested_voice_tables_flatten() {
        let txt = format!(
            "{MINIMAL}\n[voice]\nnext = \"next\"\n[voice.tools]\npen = \"mode:draw\"\n"
        );
        let p: Profile = toml::from_str(&txt).unwrap();
        assert_eq!(p.voice.get("next").map(String::as_str), Some("next"));
        assert_eq!(p.voice.get("tools.pen").map(String::as_str), Some("mode:draw"));
    }

    #[test]
    fn rejects_bad_values() {
        let mut p: Profile = toml::from_str(MINIMAL).unwrap();
        p.thresholds.zoom_in_ratio = 0.6;
        assert!(validate_profile(&p).is_err());

        let mut p: Profile = toml::from_str(MINIMAL).unwrap();
        p.thresholds.hold_frames = 0;
        assert!(validate_profile(&p).is_err());

        let mut p: Profile = toml::from_str(MINIMAL).unwrap();
        p.voice.insert("dance".into(), "mode:dance".into());
        assert!(validate_profile(&p).is_err());

        let mut p: Profile = toml::from_str(MINIMAL).unwrap();
        p.style.highlight_alpha = 1.5;
        assert!(validate_profile(&p).is_err());
    }

    #[test]
    fn profile_names_are_checked_before_use() {
        let root = std::env::temp_dir().join(format!("handmark-profiles-{}", std::process::id()));
        let profdir = root.join("profiles");
        fs::create_dir_all(&profdir).unwrap();
        fs::write(profdir.join("talk.toml"), MINIMAL).unwrap();
        fs::write(profdir.join("broken.toml"), "[meta]\nname = 3\n").unwrap();

        let mut cfg = DaemonConfigState {
            active_name: "default".to_string(),
            profile: Profile::builtin().unwrap(),
            config_dir: root.clone(),
            profiles_dir: profdir.clone(),
            active_ptr: root.join("active"),
        };

        assert!(cfg.profile_path("typo").is_err());
        assert!(cfg.profile_path("../talk").is_err());
        assert!(cfg.profile_path("").is_err());
        assert!(cfg.check_profile("broken").is_err());
        assert_eq!(cfg.check_profile("talk").unwrap().meta.name.as_deref(), Some("test"));

        assert!(cfg.set_active("typo").is_err());
        assert_eq!(cfg.active_name, "default");
        cfg.set_active("talk").unwrap();
        assert_eq!(cfg.active_name, "talk");
        assert_eq!(fs::read_to_string(root.join("active")).unwrap(), "talk");

        fs::remove_dir_all(&root).unwrap();
    }
}
