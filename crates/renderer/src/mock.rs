//! Allocation-tracking stand-in for the Vulkan backend.
//!
//! Every backend call is appended to a shared event log, and every object a
//! real backend would allocate bumps a per-category live counter. Tests
//! script acquire, present, surface extent and timestamp results.
//!
//! The GPU runs behind the CPU: a submission retires once `gpu_lag` later
//! submissions have been queued, or when the CPU blocks on its fence. The
//! presentation engine keeps the newest presented image on screen and hands
//! older ones back, in order, once the work that rendered them retired.
//! Anything a real device would reject or deadlock on panics.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;
use vkframe_rhi::query::GpuTimestamps;
use vkframe_rhi::rendering::RenderingConfig;
use vkframe_rhi::swapchain::{AcquiredImage, PresentStatus};
use vkframe_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use vkframe_rhi::{RhiError, RhiResult};

use crate::attachments::AttachmentViews;
use crate::backend::FrameBackend;
use crate::demo::{Demo, FrameContext, RenderSettings};
use crate::stats::FrameStats;

pub type EventLog = Rc<RefCell<Vec<String>>>;

pub struct MockRecorder {
    log: EventLog,
    slot: usize,
}

impl MockRecorder {
    pub fn record(&self, event: &str) {
        self.log
            .borrow_mut()
            .push(format!("{} slot={}", event, self.slot));
    }

    pub fn begin_rendering(&self, config: &RenderingConfig) {
        self.log
            .borrow_mut()
            .push(describe_scope(self.slot, config));
    }

    pub fn end_rendering(&self) {
        self.record("end_rendering");
    }
}

fn describe_scope(slot: usize, config: &RenderingConfig) -> String {
    let color = &config.color_attachments[0];
    format!(
        "begin_rendering slot={} load={:?} resolve={} depth={}",
        slot,
        color.load_op,
        color.resolve.is_some(),
        config.depth_attachment.is_some()
    )
}

/// One queue submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submission {
    pub seq: u64,
    pub slot: usize,
    pub image: u32,
}

/// A CPU wait on a slot fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FenceWait {
    pub slot: usize,
    /// The submission the wait blocked on, `None` if the fence was already
    /// signaled.
    pub blocked_on: Option<Submission>,
    /// Submissions still executing when the wait returned.
    pub outstanding_after: usize,
}

pub struct MockBackend {
    pub log: EventLog,
    recorders: Vec<MockRecorder>,
    live: BTreeMap<&'static str, i64>,

    image_count: u32,
    extent: vk::Extent2D,
    generation: u64,
    fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
    next_seq: u64,
    /// Submitted and not yet retired, oldest first.
    executing: VecDeque<Submission>,
    /// Image acquired by each slot for the frame being recorded.
    slot_image: [Option<u32>; MAX_FRAMES_IN_FLIGHT],
    /// Images owned by the application between acquire and present.
    held: Vec<u32>,
    /// Presented images with the submission that rendered them, oldest first.
    presented: VecDeque<(u32, u64)>,
    free_images: VecDeque<u32>,
    depth_view: Option<vk::ImageView>,
    msaa_view: Option<vk::ImageView>,
    next_handle: u64,

    pub max_samples: vk::SampleCountFlags,
    pub surface_extent: vk::Extent2D,
    /// Upcoming acquires that report out-of-date.
    pub out_of_date_acquires: usize,
    /// Popped per present; `Optimal` once empty.
    pub present_results: VecDeque<PresentStatus>,
    /// Popped per readback; `Ready(1.0)` once empty.
    pub timestamp_results: VecDeque<RhiResult<GpuTimestamps>>,
    /// Later submissions queued before a submission retires on its own.
    pub gpu_lag: usize,
    pub submissions: Vec<Submission>,
    pub fence_waits: Vec<FenceWait>,
    /// Most submissions ever executing at once.
    pub max_outstanding: usize,
}

impl MockBackend {
    pub fn new(image_count: u32, extent: vk::Extent2D) -> Self {
        let log = EventLog::default();
        let recorders = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| MockRecorder {
                log: log.clone(),
                slot,
            })
            .collect();
        let mut backend = Self {
            log,
            recorders,
            live: BTreeMap::new(),
            image_count,
            extent,
            generation: 0,
            fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
            next_seq: 0,
            executing: VecDeque::new(),
            slot_image: [None; MAX_FRAMES_IN_FLIGHT],
            held: Vec::new(),
            presented: VecDeque::new(),
            free_images: (0..image_count).collect(),
            depth_view: None,
            msaa_view: None,
            next_handle: 1000,
            max_samples: vk::SampleCountFlags::TYPE_8,
            surface_extent: extent,
            out_of_date_acquires: 0,
            present_results: VecDeque::new(),
            timestamp_results: VecDeque::new(),
            gpu_lag: 1,
            submissions: Vec::new(),
            fence_waits: Vec::new(),
            max_outstanding: 0,
        };
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            backend.create("frame_slot");
        }
        backend
    }

    fn push(&self, event: String) {
        self.log.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Events starting with `prefix`, in order.
    pub fn events_with(&self, prefix: &str) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Index of the first event starting with `prefix` at or after `from`.
    pub fn position(&self, prefix: &str, from: usize) -> Option<usize> {
        self.log
            .borrow()
            .iter()
            .skip(from)
            .position(|e| e.starts_with(prefix))
            .map(|i| i + from)
    }

    pub fn create(&mut self, kind: &'static str) {
        *self.live.entry(kind).or_default() += 1;
    }

    pub fn release(&mut self, kind: &'static str) {
        let count = self.live.entry(kind).or_default();
        assert!(*count > 0, "released a {kind} that was never created");
        *count -= 1;
    }

    pub fn live(&self, kind: &str) -> i64 {
        self.live.get(kind).copied().unwrap_or(0)
    }

    pub fn live_total(&self) -> i64 {
        self.live.values().sum()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One view per image, tagged with the swapchain generation.
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        (0..self.image_count)
            .map(|i| vk::ImageView::from_raw(self.generation * 100 + i as u64 + 1))
            .collect()
    }

    pub fn target_views(&self) -> (Option<vk::ImageView>, Option<vk::ImageView>) {
        (self.depth_view, self.msaa_view)
    }

    fn new_view(&mut self) -> vk::ImageView {
        self.next_handle += 1;
        vk::ImageView::from_raw(self.next_handle)
    }

    /// Retires every submission up to and including `seq`. The queue
    /// completes in order.
    fn retire_through(&mut self, seq: u64) {
        while let Some(front) = self.executing.front().copied() {
            if front.seq > seq {
                break;
            }
            self.executing.pop_front();
            self.fence_signaled[front.slot] = true;
        }
    }

    fn retire_all(&mut self) {
        if let Some(last) = self.executing.back().copied() {
            self.retire_through(last.seq);
        }
    }

    fn is_retired(&self, seq: u64) -> bool {
        self.executing.front().is_none_or(|front| front.seq > seq)
    }

    /// Hands back presented images, keeping the newest on screen.
    fn release_presented(&mut self) {
        while self.presented.len() > 1 {
            let (image, seq) = self.presented[0];
            if !self.is_retired(seq) {
                break;
            }
            self.presented.pop_front();
            self.free_images.push_back(image);
        }
    }

    /// Submissions currently executing.
    pub fn outstanding(&self) -> usize {
        self.executing.len()
    }
}

impl FrameBackend for MockBackend {
    type Recorder = MockRecorder;

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn color_format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_SRGB
    }

    fn depth_format(&self) -> vk::Format {
        vk::Format::D32_SFLOAT_S8_UINT
    }

    fn max_samples(&self) -> vk::SampleCountFlags {
        self.max_samples
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        let blocked_on = if self.fence_signaled[slot] {
            None
        } else {
            let last = self
                .executing
                .iter()
                .rev()
                .find(|s| s.slot == slot)
                .copied()
                .unwrap_or_else(|| panic!("slot {slot} fence is unsignaled with nothing executing"));
            self.retire_through(last.seq);
            Some(last)
        };
        self.fence_waits.push(FenceWait {
            slot,
            blocked_on,
            outstanding_after: self.executing.len(),
        });
        match blocked_on {
            Some(s) => self.push(format!("wait slot={slot} blocked seq={}", s.seq)),
            None => self.push(format!("wait slot={slot}")),
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
        if self.out_of_date_acquires > 0 {
            self.out_of_date_acquires -= 1;
            self.push(format!("acquire slot={slot} out_of_date"));
            return Ok(AcquiredImage::OutOfDate);
        }
        assert!(
            self.slot_image[slot].is_none(),
            "slot {slot} acquired twice without presenting"
        );

        self.release_presented();
        if self.free_images.is_empty() {
            // Blocks until the presentation engine lets an image go.
            self.retire_all();
            self.release_presented();
        }
        let index = self
            .free_images
            .pop_front()
            .unwrap_or_else(|| panic!("acquire deadlocks: every image is held or on screen"));
        assert!(
            !self.executing.iter().any(|s| s.image == index),
            "image {index} handed out while still being rendered"
        );
        self.held.push(index);
        self.slot_image[slot] = Some(index);
        self.push(format!(
            "acquire slot={slot} image={index} gen={}",
            self.generation
        ));
        Ok(AcquiredImage::Ready {
            index,
            suboptimal: false,
        })
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        assert!(
            self.fence_signaled[slot],
            "slot {slot} fence reset while its submission is executing"
        );
        self.fence_signaled[slot] = false;
        self.push(format!("reset slot={slot}"));
        Ok(())
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.push(format!("begin slot={slot}"));
        Ok(())
    }

    fn transition_image(
        &mut self,
        slot: usize,
        image_index: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        self.push(format!(
            "transition slot={slot} image={image_index} {old_layout:?}->{new_layout:?}"
        ));
        Ok(())
    }

    fn attachment_views(&self, image_index: u32) -> RhiResult<AttachmentViews> {
        let swapchain = self
            .image_views()
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| RhiError::SwapchainError(format!("no image {image_index}")))?;
        Ok(AttachmentViews {
            swapchain,
            msaa: self.msaa_view,
            depth: self.depth_view,
        })
    }

    fn recorder(&self, slot: usize) -> &MockRecorder {
        &self.recorders[slot]
    }

    fn begin_rendering(&mut self, slot: usize, config: &RenderingConfig) {
        self.push(describe_scope(slot, config));
    }

    fn end_rendering(&mut self, slot: usize) {
        self.push(format!("end_rendering slot={slot}"));
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.push(format!("end slot={slot}"));
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        assert!(
            !self.fence_signaled[slot],
            "slot {slot} submitted with a signaled fence"
        );
        assert!(
            self.executing.len() < MAX_FRAMES_IN_FLIGHT,
            "more than {MAX_FRAMES_IN_FLIGHT} submissions executing"
        );
        let image = self.slot_image[slot]
            .unwrap_or_else(|| panic!("slot {slot} submitted without an image"));

        self.next_seq += 1;
        let submission = Submission {
            seq: self.next_seq,
            slot,
            image,
        };
        self.executing.push_back(submission);
        self.submissions.push(submission);
        self.max_outstanding = self.max_outstanding.max(self.executing.len());
        self.push(format!("submit slot={slot} seq={}", submission.seq));

        while self.executing.len() > self.gpu_lag {
            let front = self.executing[0];
            self.retire_through(front.seq);
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentStatus> {
        assert_eq!(
            self.slot_image[slot].take(),
            Some(image_index),
            "slot {slot} presented an image it did not acquire"
        );
        self.held.retain(|&i| i != image_index);
        let seq = self
            .submissions
            .iter()
            .rev()
            .find(|s| s.slot == slot)
            .map(|s| s.seq)
            .unwrap_or_else(|| panic!("slot {slot} presented before submitting"));
        self.presented.push_back((image_index, seq));
        self.release_presented();

        let status = self
            .present_results
            .pop_front()
            .unwrap_or(PresentStatus::Optimal);
        self.push(format!("present slot={slot} image={image_index} {status:?}"));
        Ok(status)
    }

    fn read_gpu_time(&mut self, slot: usize) -> RhiResult<GpuTimestamps> {
        assert!(
            !self.executing.iter().any(|s| s.slot == slot),
            "slot {slot} timestamps read while its submission is executing"
        );
        self.push(format!("timestamps slot={slot}"));
        self.timestamp_results
            .pop_front()
            .unwrap_or(Ok(GpuTimestamps::Ready(1.0)))
    }

    fn surface_extent(&self) -> RhiResult<vk::Extent2D> {
        Ok(self.surface_extent)
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.retire_all();
        self.push("wait_idle".to_string());
        Ok(())
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        assert!(extent.width > 0 && extent.height > 0);
        assert!(
            self.executing.is_empty(),
            "swapchain replaced with work executing"
        );
        assert!(
            self.held.is_empty(),
            "swapchain replaced while images {:?} are acquired",
            self.held
        );
        self.presented.clear();
        self.free_images = (0..self.image_count).collect();
        self.generation += 1;
        self.extent = extent;
        self.push(format!(
            "recreate_swapchain {}x{} gen={}",
            extent.width, extent.height, self.generation
        ));
        Ok(())
    }

    fn create_targets(&mut self, samples: vk::SampleCountFlags) -> RhiResult<()> {
        self.destroy_targets();
        self.create("render_target");
        self.depth_view = Some(self.new_view());
        if samples != vk::SampleCountFlags::TYPE_1 {
            self.create("render_target");
            self.msaa_view = Some(self.new_view());
        }
        self.push(format!("create_targets samples={}", samples.as_raw()));
        Ok(())
    }

    fn destroy_targets(&mut self) {
        if self.depth_view.take().is_some() {
            self.release("render_target");
        }
        if self.msaa_view.take().is_some() {
            self.release("render_target");
        }
    }

    fn destroy(&mut self) {
        assert!(self.executing.is_empty(), "destroyed with work executing");
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            self.release("frame_slot");
        }
        self.push("destroy".to_string());
    }
}

/// Demo that allocates one object of each category and records its hooks.
#[derive(Default)]
pub struct MockDemo {
    pub hooks: Vec<String>,
    prepared: bool,
}

impl MockDemo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Demo<MockBackend> for MockDemo {
    fn name(&self) -> &str {
        "mock"
    }

    fn on_init(&mut self) {
        self.hooks.push("init".to_string());
    }

    fn on_prepare(&mut self, backend: &mut MockBackend, settings: &RenderSettings) -> RhiResult<()> {
        for kind in ["buffer", "texture", "descriptor_set_layout", "pipeline"] {
            backend.create(kind);
        }
        self.prepared = true;
        self.hooks
            .push(format!("prepare samples={}", settings.samples.as_raw()));
        Ok(())
    }

    fn on_update(&mut self, _delta_secs: f32, _settings: &mut RenderSettings) {
        self.hooks.push("update".to_string());
    }

    fn draw(&mut self, ctx: &FrameContext<'_, MockRecorder>) -> RhiResult<()> {
        ctx.recorder.begin_rendering(ctx.scene_attachments());
        ctx.recorder.record("draw");
        ctx.recorder.end_rendering();
        Ok(())
    }

    fn draw_ui(&mut self, ctx: &FrameContext<'_, MockRecorder>, stats: &FrameStats) -> RhiResult<()> {
        ctx.recorder.record(&format!("ui frames={}", stats.frames));
        Ok(())
    }

    fn on_window_resize(&mut self, _backend: &mut MockBackend, extent: vk::Extent2D) -> RhiResult<()> {
        self.hooks
            .push(format!("window_resize {}x{}", extent.width, extent.height));
        Ok(())
    }

    fn on_scene_resize(&mut self, _backend: &mut MockBackend, extent: vk::Extent2D) -> RhiResult<()> {
        self.hooks
            .push(format!("scene_resize {}x{}", extent.width, extent.height));
        Ok(())
    }

    fn on_sample_count_changed(
        &mut self,
        backend: &mut MockBackend,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<()> {
        backend.release("pipeline");
        backend.create("pipeline");
        self.hooks
            .push(format!("sample_count_changed {}", samples.as_raw()));
        Ok(())
    }

    fn on_min_lod_changed(&mut self, backend: &mut MockBackend, min_lod: f32) -> RhiResult<()> {
        backend.release("texture");
        backend.create("texture");
        self.hooks.push(format!("min_lod_changed {min_lod}"));
        Ok(())
    }

    fn on_destroy(&mut self, backend: &mut MockBackend) {
        if self.prepared {
            for kind in ["pipeline", "descriptor_set_layout", "texture", "buffer"] {
                backend.release(kind);
            }
            self.prepared = false;
        }
        self.hooks.push("destroy".to_string());
    }
}
