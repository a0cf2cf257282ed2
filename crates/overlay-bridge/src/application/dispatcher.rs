//! Per-message handling for one bridge session.
//!
//! The [`Dispatcher`] is owned by the session's dispatch loop and is the only
//! code that touches session-scoped state (the last known canvas, refetched
//! on every welcome and every transform).  It never spawns anything and
//! holds no locks; each call runs to completion before the loop picks the
//! next event.
//!
//! # Failure classes
//!
//! | Failure                         | Handling                              |
//! |---------------------------------|---------------------------------------|
//! | malformed envelope or command   | `warn!`, message dropped              |
//! | relay write (`SendError`)       | `warn!`, loop continues               |
//! | control tool (`ControlError`)   | returned; ends the session            |

use std::sync::Arc;

use overlay_core::translate::{apply_fixed_bounds, select_managed_items, to_pixel, to_wire_details};
use overlay_core::{
    Action, ActionEnvelope, InfoWindowConfig, TransformCommand, VideoCanvas,
    VideoSettingsPayload, WindowBoundsConfig,
};
use tracing::{debug, info, warn};

use crate::application::ports::{ControlClient, ControlError, RelaySink, SendError};

/// Static inputs shared by every session of a controller.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    /// Scene whose items are read and written.
    pub scene_name: String,
    /// Source names that take part in synchronization.
    pub managed_sources: Vec<String>,
    /// Sent verbatim as `update_bounds` during the welcome handshake.
    pub window_bounds: WindowBoundsConfig,
    /// Sent verbatim as `update_info_window_config` during the handshake.
    pub info_window: InfoWindowConfig,
}

/// Handles inbound relay frames and produces the outbound replies.
pub struct Dispatcher {
    control: Arc<dyn ControlClient>,
    settings: Arc<DispatchSettings>,
    canvas: VideoCanvas,
}

impl Dispatcher {
    /// `canvas` is the resolution fetched when the session started.
    pub fn new(
        control: Arc<dyn ControlClient>,
        settings: Arc<DispatchSettings>,
        canvas: VideoCanvas,
    ) -> Self {
        Self {
            control,
            settings,
            canvas,
        }
    }

    /// Last canvas resolution read from the control tool.
    pub fn canvas(&self) -> VideoCanvas {
        self.canvas
    }

    /// Decodes one inbound frame and acts on it.
    ///
    /// Returns `Err` only for control-tool failures, which end the session.
    pub async fn handle_frame<S>(&mut self, sink: &mut S, frame: &str) -> Result<(), ControlError>
    where
        S: RelaySink + ?Sized,
    {
        let envelope = match ActionEnvelope::from_json(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "discarding malformed relay message");
                return Ok(());
            }
        };

        match envelope.kind() {
            Some(Action::Welcome) => self.send_welcome(sink).await,
            Some(Action::SetSceneItemTransform) => self.apply_transform(sink, &envelope).await,
            Some(other) => {
                debug!(action = %other, "ignoring outbound-only action from relay");
                Ok(())
            }
            None => {
                debug!(action = %envelope.action, "ignoring unrecognized action");
                Ok(())
            }
        }
    }

    /// Sends a `ping`.  Failures are logged; the read loop is the authority
    /// on whether the connection is gone.
    pub async fn send_keepalive<S>(&self, sink: &mut S)
    where
        S: RelaySink + ?Sized,
    {
        if let Err(e) = sink.send_envelope(&ActionEnvelope::ping()).await {
            warn!(error = %e, "failed to send keepalive ping");
        }
    }

    /// Reads the scene, filters it to the managed items and sends the full
    /// `update_scene_items` snapshot.
    pub async fn broadcast<S>(&self, sink: &mut S) -> Result<(), ControlError>
    where
        S: RelaySink + ?Sized,
    {
        let items = self
            .control
            .list_scene_items(&self.settings.scene_name)
            .await?;
        let managed = select_managed_items(&items, &self.settings.managed_sources);
        debug!(
            total = items.len(),
            managed = managed.len(),
            "broadcasting scene items"
        );

        let payload = to_wire_details(&managed);
        if let Err(e) = send_action(sink, Action::UpdateSceneItems, &payload).await {
            warn!(error = %e, "failed to broadcast scene items");
        }
        Ok(())
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    /// Synchronization handshake: canvas size, window bounds, info windows,
    /// then the item snapshot.  Stops at the first failed send.
    async fn send_welcome<S>(&mut self, sink: &mut S) -> Result<(), ControlError>
    where
        S: RelaySink + ?Sized,
    {
        info!("viewer joined, sending welcome handshake");
        self.canvas = self.control.get_video_canvas().await?;
        if let Err(e) = self.send_static_config(sink).await {
            warn!(error = %e, "welcome handshake interrupted");
            return Ok(());
        }
        self.broadcast(sink).await
    }

    async fn send_static_config<S>(&self, sink: &mut S) -> Result<(), SendError>
    where
        S: RelaySink + ?Sized,
    {
        let video = VideoSettingsPayload {
            output_width: self.canvas.base_width,
            output_height: self.canvas.base_height,
        };
        send_action(sink, Action::UpdateVideoSettings, &video).await?;
        send_action(sink, Action::UpdateBounds, &self.settings.window_bounds).await?;
        send_action(sink, Action::UpdateInfoWindowConfig, &self.settings.info_window).await
    }

    /// Read-modify-write of one item's transform followed by a broadcast.
    async fn apply_transform<S>(
        &mut self,
        sink: &mut S,
        envelope: &ActionEnvelope,
    ) -> Result<(), ControlError>
    where
        S: RelaySink + ?Sized,
    {
        let command: TransformCommand = match envelope.payload() {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "discarding malformed transform command");
                return Ok(());
            }
        };

        // The canvas can be resized between messages.
        self.canvas = self.control.get_video_canvas().await?;

        let scene = self.settings.scene_name.as_str();
        let mut transform = self
            .control
            .get_item_transform(scene, command.item_id)
            .await?;

        let (x, y) = to_pixel(&command, &self.canvas);
        transform.position_x = x;
        transform.position_y = y;
        apply_fixed_bounds(&mut transform);

        self.control
            .set_item_transform(scene, command.item_id, &transform)
            .await?;
        debug!(
            item_id = command.item_id,
            x,
            y,
            user_id = %command.user_id,
            "applied scene item transform"
        );

        self.broadcast(sink).await
    }
}

async fn send_action<S, T>(sink: &mut S, action: Action, payload: &T) -> Result<(), SendError>
where
    S: RelaySink + ?Sized,
    T: serde::Serialize,
{
    let envelope = ActionEnvelope::new(action, payload)?;
    sink.send_envelope(&envelope).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockControlClient, VersionInfo};
    use async_trait::async_trait;
    use overlay_core::{ItemTransform, SceneItem, SceneItemWrapper};
    use serde_json::json;
    use std::sync::Mutex;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Records every envelope; fails every send from `fail_from` onwards.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<ActionEnvelope>,
        fail_from: Option<usize>,
        attempts: usize,
    }

    #[async_trait]
    impl RelaySink for RecordingSink {
        async fn send_envelope(&mut self, envelope: &ActionEnvelope) -> Result<(), SendError> {
            self.attempts += 1;
            if self.fail_from.is_some_and(|n| self.attempts > n) {
                return Err(SendError::Transport("injected failure".into()));
            }
            self.sent.push(envelope.clone());
            Ok(())
        }
    }

    impl RecordingSink {
        fn actions(&self) -> Vec<String> {
            self.sent.iter().map(|e| e.action.clone()).collect()
        }
    }

    struct RecordingControl {
        canvas: Mutex<VideoCanvas>,
        items: Vec<SceneItem>,
        transform: ItemTransform,
        set_calls: Mutex<Vec<(String, i64, ItemTransform)>>,
        list_calls: Mutex<usize>,
    }

    impl RecordingControl {
        fn new() -> Self {
            let mut extra = serde_json::Map::new();
            extra.insert("rotation".to_string(), json!(45.0));
            Self {
                canvas: Mutex::new(VideoCanvas::new(1920.0, 1080.0)),
                items: vec![
                    scene_item(7, "gif", 100.0, 50.0, 10.0, 20.0),
                    scene_item(8, "camera", 640.0, 360.0, 0.0, 0.0),
                ],
                transform: ItemTransform {
                    position_x: 10.0,
                    position_y: 20.0,
                    bounds_width: 0.0,
                    bounds_height: 0.0,
                    extra,
                },
                set_calls: Mutex::new(Vec::new()),
                list_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ControlClient for RecordingControl {
        async fn get_video_canvas(&self) -> Result<VideoCanvas, ControlError> {
            Ok(*self.canvas.lock().unwrap())
        }

        async fn list_scene_items(&self, _scene: &str) -> Result<Vec<SceneItem>, ControlError> {
            *self.list_calls.lock().unwrap() += 1;
            Ok(self.items.clone())
        }

        async fn get_item_transform(
            &self,
            _scene: &str,
            _item_id: i64,
        ) -> Result<ItemTransform, ControlError> {
            Ok(self.transform.clone())
        }

        async fn set_item_transform(
            &self,
            scene: &str,
            item_id: i64,
            transform: &ItemTransform,
        ) -> Result<(), ControlError> {
            self.set_calls
                .lock()
                .unwrap()
                .push((scene.to_string(), item_id, transform.clone()));
            Ok(())
        }

        async fn get_version_info(&self) -> Result<VersionInfo, ControlError> {
            Ok(VersionInfo::default())
        }

        async fn disconnect(&self) -> Result<(), ControlError> {
            Ok(())
        }
    }

    fn scene_item(id: i64, source: &str, w: f64, h: f64, x: f64, y: f64) -> SceneItem {
        SceneItem {
            item_id: id,
            source_name: source.to_string(),
            width: w,
            height: h,
            x,
            y,
        }
    }

    fn settings() -> Arc<DispatchSettings> {
        Arc::new(DispatchSettings {
            scene_name: "Scene".to_string(),
            managed_sources: vec!["gitEasy".into(), "gif".into(), "guest1".into()],
            ..DispatchSettings::default()
        })
    }

    fn dispatcher(control: Arc<dyn ControlClient>) -> Dispatcher {
        Dispatcher::new(control, settings(), VideoCanvas::new(1920.0, 1080.0))
    }

    const TRANSFORM_FRAME: &str = r##"{"action":"set_scene_item_transform","data":{"itemId":7,"x":0.5,"y":0.25,"color":"#fff","userId":"u1"}}"##;

    // ── Welcome handshake ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_welcome_sends_handshake_in_order() {
        // Arrange
        let mut d = dispatcher(Arc::new(RecordingControl::new()));
        let mut sink = RecordingSink::default();

        // Act
        d.handle_frame(&mut sink, r#"{"action":"welcome"}"#)
            .await
            .unwrap();

        // Assert
        assert_eq!(
            sink.actions(),
            vec![
                "update_video_settings",
                "update_bounds",
                "update_info_window_config",
                "update_scene_items"
            ]
        );
        let video: VideoSettingsPayload = sink.sent[0].payload().unwrap();
        assert_eq!(video.output_width, 1920.0);
        assert_eq!(video.output_height, 1080.0);

        let items: Vec<SceneItemWrapper> = sink.sent[3].payload().unwrap();
        assert_eq!(items.len(), 1, "only the managed item is broadcast");
        assert_eq!(items[0].data[0].item_id, 7);
        assert_eq!(items[0].data[0].width, "100.000000");
    }

    #[tokio::test]
    async fn test_welcome_stops_at_first_failed_send() {
        let control = Arc::new(RecordingControl::new());
        let mut d = dispatcher(control.clone());
        let mut sink = RecordingSink {
            fail_from: Some(1),
            ..RecordingSink::default()
        };

        let result = d.handle_frame(&mut sink, r#"{"action":"welcome"}"#).await;

        assert!(result.is_ok(), "send failures are not fatal");
        assert_eq!(sink.actions(), vec!["update_video_settings"]);
        assert_eq!(sink.attempts, 2);
        assert_eq!(*control.list_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_welcome_reports_current_canvas_after_resize() {
        // Arrange: the tool switched resolution after the session started
        let control = Arc::new(RecordingControl::new());
        let mut d = dispatcher(control.clone());
        *control.canvas.lock().unwrap() = VideoCanvas::new(1280.0, 720.0);
        let mut sink = RecordingSink::default();

        // Act
        d.handle_frame(&mut sink, r#"{"action":"welcome"}"#)
            .await
            .unwrap();

        // Assert
        let video: VideoSettingsPayload = sink.sent[0].payload().unwrap();
        assert_eq!((video.output_width, video.output_height), (1280.0, 720.0));
        assert_eq!(d.canvas(), VideoCanvas::new(1280.0, 720.0));
    }

    #[tokio::test]
    async fn test_welcome_canvas_failure_is_fatal_and_sends_nothing() {
        let mut mock = MockControlClient::new();
        mock.expect_get_video_canvas()
            .times(1)
            .returning(|| Err(ControlError::ConnectionClosed));
        mock.expect_list_scene_items().never();
        let mut d = dispatcher(Arc::new(mock));
        let mut sink = RecordingSink::default();

        let result = d.handle_frame(&mut sink, r#"{"action":"welcome"}"#).await;

        assert!(matches!(result, Err(ControlError::ConnectionClosed)));
        assert!(sink.sent.is_empty());
    }

    // ── Transform apply ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_transform_sets_pixel_position_and_fixed_bounds() {
        // Arrange
        let control = Arc::new(RecordingControl::new());
        let mut d = dispatcher(control.clone());
        let mut sink = RecordingSink::default();

        // Act
        d.handle_frame(&mut sink, TRANSFORM_FRAME).await.unwrap();

        // Assert: one write with the converted position
        let calls = control.set_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (scene, id, transform) = &calls[0];
        assert_eq!(scene, "Scene");
        assert_eq!(*id, 7);
        assert_eq!(transform.position_x, 960.0);
        assert_eq!(transform.position_y, 270.0);
        assert_eq!(transform.bounds_width, 1.0);
        assert_eq!(transform.bounds_height, 1.0);
        assert_eq!(transform.extra.get("rotation"), Some(&json!(45.0)));

        // ...followed by exactly one broadcast
        assert_eq!(sink.actions(), vec!["update_scene_items"]);
    }

    #[tokio::test]
    async fn test_transform_uses_refetched_canvas() {
        let control = Arc::new(RecordingControl::new());
        let mut d = dispatcher(control.clone());
        *control.canvas.lock().unwrap() = VideoCanvas::new(1280.0, 720.0);

        d.handle_frame(&mut RecordingSink::default(), TRANSFORM_FRAME)
            .await
            .unwrap();

        let calls = control.set_calls.lock().unwrap();
        assert_eq!(calls[0].2.position_x, 640.0);
        assert_eq!(calls[0].2.position_y, 180.0);
        assert_eq!(d.canvas(), VideoCanvas::new(1280.0, 720.0));
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_pass_through_unclamped() {
        let control = Arc::new(RecordingControl::new());
        let mut d = dispatcher(control.clone());
        let frame = r#"{"action":"set_scene_item_transform","data":{"id":7,"x":1.5,"y":-0.5}}"#;

        d.handle_frame(&mut RecordingSink::default(), frame)
            .await
            .unwrap();

        let calls = control.set_calls.lock().unwrap();
        assert_eq!(calls[0].2.position_x, 2880.0);
        assert_eq!(calls[0].2.position_y, -540.0);
    }

    #[tokio::test]
    async fn test_malformed_transform_payload_is_dropped() {
        let control = Arc::new(RecordingControl::new());
        let mut d = dispatcher(control.clone());
        let mut sink = RecordingSink::default();
        let frame = r#"{"action":"set_scene_item_transform","data":{"itemId":"seven"}}"#;

        let result = d.handle_frame(&mut sink, frame).await;

        assert!(result.is_ok());
        assert!(control.set_calls.lock().unwrap().is_empty());
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn test_control_failure_is_fatal_and_skips_write() {
        // Arrange
        let mut mock = MockControlClient::new();
        mock.expect_get_video_canvas()
            .times(1)
            .returning(|| Ok(VideoCanvas::new(1920.0, 1080.0)));
        mock.expect_get_item_transform().times(1).returning(|_, _| {
            Err(ControlError::Timeout {
                request: "GetSceneItemTransform".to_string(),
            })
        });
        mock.expect_set_item_transform().never();
        mock.expect_list_scene_items().never();
        let mut d = dispatcher(Arc::new(mock));
        let mut sink = RecordingSink::default();

        // Act
        let result = d.handle_frame(&mut sink, TRANSFORM_FRAME).await;

        // Assert
        assert!(matches!(result, Err(ControlError::Timeout { .. })));
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_failure_after_write_is_fatal() {
        let mut mock = MockControlClient::new();
        mock.expect_get_video_canvas()
            .returning(|| Ok(VideoCanvas::new(1920.0, 1080.0)));
        mock.expect_get_item_transform()
            .returning(|_, _| Ok(ItemTransform::default()));
        mock.expect_set_item_transform()
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_list_scene_items()
            .times(1)
            .returning(|_| Err(ControlError::ConnectionClosed));
        let mut d = dispatcher(Arc::new(mock));

        let result = d
            .handle_frame(&mut RecordingSink::default(), TRANSFORM_FRAME)
            .await;

        assert!(matches!(result, Err(ControlError::ConnectionClosed)));
    }

    // ── Everything else ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_malformed_envelope_is_ignored() {
        let mut d = dispatcher(Arc::new(RecordingControl::new()));
        let mut sink = RecordingSink::default();

        assert!(d.handle_frame(&mut sink, "not json").await.is_ok());
        assert!(d.handle_frame(&mut sink, r#"{"data":{}}"#).await.is_ok());
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_is_ignored() {
        let mut mock = MockControlClient::new();
        mock.expect_list_scene_items().never();
        let mut d = dispatcher(Arc::new(mock));
        let mut sink = RecordingSink::default();

        let result = d
            .handle_frame(&mut sink, r#"{"action":"chat_message","data":{"text":"hi"}}"#)
            .await;

        assert!(result.is_ok());
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_failure_is_swallowed() {
        let d = dispatcher(Arc::new(RecordingControl::new()));
        let mut sink = RecordingSink {
            fail_from: Some(0),
            ..RecordingSink::default()
        };

        d.send_keepalive(&mut sink).await;

        assert_eq!(sink.attempts, 1);
        assert!(sink.sent.is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_sends_ping() {
        let d = dispatcher(Arc::new(RecordingControl::new()));
        let mut sink = RecordingSink::default();

        d.send_keepalive(&mut sink).await;

        assert_eq!(sink.actions(), vec!["ping"]);
        assert_eq!(sink.sent[0].data, json!({}));
    }
}
