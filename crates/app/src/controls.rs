//! Keyboard controls and the stats line shown in the window title.

use ash::vk;
use vkframe_renderer::{FrameStats, RenderSettings};
use winit::keyboard::KeyCode;

/// Step applied to the sampler's minimum LOD per key press.
pub const LOD_STEP: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Exit,
    CycleMsaa,
    LodDown,
    LodUp,
}

pub fn action_for(key: KeyCode) -> Option<Action> {
    match key {
        KeyCode::Escape => Some(Action::Exit),
        KeyCode::KeyM => Some(Action::CycleMsaa),
        KeyCode::BracketLeft => Some(Action::LodDown),
        KeyCode::BracketRight => Some(Action::LodUp),
        _ => None,
    }
}

/// Doubles the sample count, wrapping to one sample past `max`.
pub fn next_sample_count(
    current: vk::SampleCountFlags,
    max: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let next = current.as_raw().saturating_mul(2);
    if next > max.as_raw() {
        vk::SampleCountFlags::TYPE_1
    } else {
        vk::SampleCountFlags::from_raw(next)
    }
}

/// Writes the change an action requests into `settings`. The renderer
/// applies it on its next update.
pub fn apply(action: Action, settings: &mut RenderSettings, max_samples: vk::SampleCountFlags) {
    match action {
        Action::CycleMsaa => settings.samples = next_sample_count(settings.samples, max_samples),
        Action::LodDown => settings.min_lod = (settings.min_lod - LOD_STEP).max(0.0),
        Action::LodUp => settings.min_lod += LOD_STEP,
        Action::Exit => {}
    }
}

pub fn window_title(
    base: &str,
    demo: &str,
    stats: &FrameStats,
    settings: &RenderSettings,
) -> String {
    let gpu = match stats.gpu_time_ms {
        Some(ms) => format!("{:.2} ms", ms),
        None => "n/a".to_string(),
    };
    format!(
        "{} - {} | {:.0} fps ({:.2} ms) | gpu {} | msaa x{} | min lod {:.0}",
        base,
        demo,
        stats.fps,
        stats.frame_time_ms,
        gpu,
        settings.samples.as_raw(),
        settings.min_lod
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::SampleCountFlags as S;

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(action_for(KeyCode::Escape), Some(Action::Exit));
        assert_eq!(action_for(KeyCode::KeyM), Some(Action::CycleMsaa));
        assert_eq!(action_for(KeyCode::KeyQ), None);
    }

    #[test]
    fn msaa_cycles_up_to_the_device_limit() {
        assert_eq!(next_sample_count(S::TYPE_1, S::TYPE_8), S::TYPE_2);
        assert_eq!(next_sample_count(S::TYPE_4, S::TYPE_8), S::TYPE_8);
        assert_eq!(next_sample_count(S::TYPE_8, S::TYPE_8), S::TYPE_1);
        assert_eq!(next_sample_count(S::TYPE_1, S::TYPE_1), S::TYPE_1);
    }

    #[test]
    fn lod_never_goes_negative() {
        let mut settings = RenderSettings::default();
        apply(Action::LodDown, &mut settings, S::TYPE_4);
        assert_eq!(settings.min_lod, 0.0);
        apply(Action::LodUp, &mut settings, S::TYPE_4);
        apply(Action::LodUp, &mut settings, S::TYPE_4);
        assert_eq!(settings.min_lod, 2.0);
    }

    #[test]
    fn title_reports_missing_gpu_time() {
        let stats = FrameStats::new();
        let title = window_title("vkframe", "triangle", &stats, &RenderSettings::default());
        assert!(title.starts_with("vkframe - triangle"));
        assert!(title.contains("gpu n/a"));
        assert!(title.contains("msaa x1"));
    }
}
