//! Main system tray component.
//!
//! Runs the `system-tray` SNI client in a subscription, mirrors its items
//! into the shared [`SniWatcher`] and renders them through a [`TrayPanel`].

use std::future;
use std::rc::Rc;
use std::sync::Arc;

use iced::event::{self, Event};
use iced::futures::SinkExt;
use iced::widget::container;
use iced::{mouse, stream};
use iced::{Element, Length, Point, Subscription, Task};
use system_tray::client::ActivateRequest;
use tracing::{debug, error, info, warn};

use super::item::{ItemInput, ItemStyle};
use super::menu::{self, MenuItem};
use super::panel::{TrayPanel, DEFAULT_ICON_SIZE};
use super::service::{PointerEvent, TrayWatcher};
use super::sni::{self, ItemSnapshot, SniClient, SniWatcher};

/// Messages that the SystemTray component can handle.
#[derive(Debug, Clone)]
pub enum Message {
    /// The SNI client is connected
    ClientReady(SniClient),
    /// SNI item was registered
    ItemAdded(ItemSnapshot),
    /// SNI item properties changed
    ItemUpdated(ItemSnapshot),
    /// SNI item menu was updated
    MenuUpdated {
        address: String,
        menu_items: Vec<MenuItem>,
    },
    /// SNI item was removed
    ItemRemoved(String),
    /// User pressed a pointer button on a tray icon
    ButtonPressed { address: String, button: u32 },
    /// Pointer entered or left a tray icon
    HoverChanged { address: String, hovered: bool },
    /// Pointer moved within the bar
    CursorMoved(Point),
    /// A menu should be shown; handled by the host window
    OpenMenu {
        address: String,
        items: Vec<MenuItem>,
    },
    /// User clicked a menu item
    MenuItemClicked { address: String, menu_id: i32 },
    /// Menu activation request completed
    ActivationComplete,
}

/// The main SystemTray component state.
pub struct SystemTray {
    watcher: Rc<SniWatcher>,
    panel: TrayPanel,
    style: ItemStyle,
    spacing: f32,
    /// Last pointer position, handed to items with each press.
    cursor: Point,
}

impl Default for SystemTray {
    fn default() -> Self {
        Self::new(DEFAULT_ICON_SIZE)
    }
}

impl std::fmt::Debug for SystemTray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemTray")
            .field("watcher", &self.watcher)
            .field("panel", &self.panel)
            .finish()
    }
}

impl SystemTray {
    pub fn new(icon_size: u16) -> Self {
        Self::with_watcher(sni::shared_watcher(), icon_size)
    }

    pub fn with_watcher(watcher: Rc<SniWatcher>, icon_size: u16) -> Self {
        let panel = TrayPanel::new(Rc::clone(&watcher) as Rc<dyn TrayWatcher>, icon_size);
        Self {
            watcher,
            panel,
            style: ItemStyle::default(),
            spacing: 4.0,
            cursor: Point::ORIGIN,
        }
    }

    pub fn set_icon_size(&mut self, size: u16) {
        self.panel.set_icon_size(size);
    }

    pub fn set_style(&mut self, style: ItemStyle, spacing: f32) {
        self.style = style;
        self.spacing = spacing;
    }

    /// Update the component state based on received messages.
    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ClientReady(client) => {
                info!("system tray client connected");
                self.watcher.attach_client(client);
                Task::none()
            }

            Message::ItemAdded(snapshot) => {
                self.watcher.insert(snapshot);
                Task::none()
            }

            Message::ItemUpdated(snapshot) => {
                self.watcher.update(snapshot);
                Task::none()
            }

            Message::MenuUpdated {
                address,
                menu_items,
            } => {
                self.watcher.set_menu(&address, menu_items);
                Task::none()
            }

            Message::ItemRemoved(address) => {
                self.watcher.remove(&address);
                Task::none()
            }

            Message::ButtonPressed { address, button } => {
                if let Err(err) = self.panel.handle_press(&address, &self.pointer_event(button)) {
                    error!(identifier = %address, button, error = %err, "tray item request failed");
                }
                Task::batch(self.requested_menus().into_iter().map(Task::done))
            }

            Message::HoverChanged { address, hovered } => {
                self.panel.set_hovered(&address, hovered);
                Task::none()
            }

            Message::CursorMoved(position) => {
                self.cursor = position;
                Task::none()
            }

            // Intercepted by the host; nothing to do if it was not.
            Message::OpenMenu { .. } => Task::none(),

            Message::MenuItemClicked { address, menu_id } => {
                let Some(client) = self.watcher.client() else {
                    warn!(address = %address, menu_id, "menu item clicked before the tray client connected");
                    return Task::none();
                };

                let menu_path = self.watcher.menu_path(&address);
                Task::perform(
                    async move {
                        let request = ActivateRequest::MenuItem {
                            address: address.clone(),
                            menu_path,
                            submenu_id: menu_id,
                        };
                        if let Err(err) = client.activate(request).await {
                            warn!(address = %address, menu_id, error = %err, "menu item activation failed");
                        }
                    },
                    |_| Message::ActivationComplete,
                )
            }

            Message::ActivationComplete => Task::none(),
        }
    }

    fn pointer_event(&self, button: u32) -> PointerEvent {
        PointerEvent::at(button, self.cursor.x as i32, self.cursor.y as i32)
    }

    /// Turn menu requests made by the last click into [`Message::OpenMenu`].
    /// Items without a menu produce nothing.
    fn requested_menus(&self) -> Vec<Message> {
        self.watcher
            .take_menu_requests()
            .into_iter()
            .filter_map(|request| {
                let items = self.watcher.menu(&request.address);
                if items.is_empty() {
                    debug!(address = %request.address, "tray item has no menu to show");
                    return None;
                }
                Some(Message::OpenMenu {
                    address: request.address,
                    items,
                })
            })
            .collect()
    }

    /// Render the system tray component.
    pub fn view(&self) -> Element<'_, Message> {
        let icons = self
            .panel
            .view(self.style, self.spacing, |address, input| match input {
                ItemInput::Press(button) => Message::ButtonPressed { address, button },
                ItemInput::Hover(hovered) => Message::HoverChanged { address, hovered },
            });

        container(icons)
            .width(Length::Shrink)
            .height(Length::Fill)
            .center_y(Length::Fill)
            .padding([0, 8])
            .into()
    }

    /// Subscribe to system tray events.
    pub fn subscription(&self) -> Subscription<Message> {
        Subscription::batch(vec![
            Subscription::run_with_id("system-tray-events", stream::channel(100, run_tray_client)),
            event::listen_with(|event, _status, _window| match event {
                Event::Mouse(mouse::Event::CursorMoved { position }) => {
                    Some(Message::CursorMoved(position))
                }
                _ => None,
            }),
        ])
    }
}

/// Run the system tray client and forward events to messages.
async fn run_tray_client(mut output: iced::futures::channel::mpsc::Sender<Message>) {
    use system_tray::client::{Client, Event, UpdateEvent};

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "system tray needs a tokio runtime");
            future::pending::<()>().await;
            return;
        }
    };

    let client = match Client::new().await {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "failed to create system-tray client");
            future::pending::<()>().await;
            return;
        }
    };

    // Item methods are called directly so their error replies are seen.
    let connection = match zbus::Connection::session().await {
        Ok(connection) => connection,
        Err(e) => {
            error!(error = %e, "failed to connect to the session bus");
            future::pending::<()>().await;
            return;
        }
    };

    let _ = output
        .send(Message::ClientReady(SniClient::new(
            Arc::clone(&client),
            connection,
            runtime,
        )))
        .await;

    // Subscribe before reading the initial items so nothing falls between.
    let mut rx = client.subscribe();

    // Copy out of the lock before awaiting.
    let initial: Vec<(ItemSnapshot, Option<Vec<MenuItem>>)> = {
        let items = client.items();
        let snapshot = match items.lock() {
            Ok(guard) => guard
                .iter()
                .map(|(address, (item, menu))| {
                    (
                        ItemSnapshot::from_sni(address, item),
                        menu.as_ref().map(menu::convert_menu),
                    )
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        snapshot
    };

    for (snapshot, menu_items) in initial {
        let address = snapshot.address.clone();
        let _ = output.send(Message::ItemAdded(snapshot)).await;

        if let Some(menu_items) = menu_items {
            let _ = output
                .send(Message::MenuUpdated {
                    address,
                    menu_items,
                })
                .await;
        }
    }

    loop {
        let message = match rx.recv().await {
            Ok(Event::Add(address, item)) => Message::ItemAdded(ItemSnapshot::from_sni(&address, &item)),
            Ok(Event::Update(address, UpdateEvent::Menu(menu))) => Message::MenuUpdated {
                menu_items: menu::convert_menu(&menu),
                address,
            },
            Ok(Event::Update(address, _)) => {
                // The client applies the update to its own map; resend the
                // whole item rather than patching individual properties.
                let snapshot = {
                    let items = client.items();
                    let snapshot = match items.lock() {
                        Ok(guard) => guard
                            .get(&address)
                            .map(|(item, _)| ItemSnapshot::from_sni(&address, item)),
                        Err(_) => None,
                    };
                    snapshot
                };
                match snapshot {
                    Some(snapshot) => Message::ItemUpdated(snapshot),
                    None => continue,
                }
            }
            Ok(Event::Remove(address)) => Message::ItemRemoved(address),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "system tray events dropped");
                continue;
            }
            Err(e) => {
                error!(error = %e, "system tray event stream closed");
                break;
            }
        };

        if output.send(message).await.is_err() {
            break;
        }
    }

    future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::system_tray::menu::MenuItem;
    use crate::components::system_tray::service::{BUTTON_PRIMARY, BUTTON_SECONDARY};
    use crate::components::system_tray::test_support::capture_logs;
    use tracing::Level;

    fn tray() -> (SystemTray, Rc<SniWatcher>) {
        let watcher = Rc::new(SniWatcher::new());
        (SystemTray::with_watcher(Rc::clone(&watcher), 24), watcher)
    }

    fn snapshot(address: &str) -> ItemSnapshot {
        ItemSnapshot {
            address: address.to_string(),
            title: Some("blueman".to_string()),
            ..ItemSnapshot::default()
        }
    }

    #[test]
    fn messages_drive_the_panel() {
        let (mut tray, _watcher) = tray();

        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));
        let _ = tray.update(Message::ItemAdded(snapshot(":1.2")));
        assert_eq!(tray.panel.identifiers(), vec![":1.4", ":1.2"]);

        let _ = tray.update(Message::ItemRemoved(":1.4".to_string()));
        assert_eq!(tray.panel.identifiers(), vec![":1.2"]);
    }

    #[test]
    fn icon_size_reaches_existing_items() {
        let (mut tray, _watcher) = tray();
        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));

        tray.set_icon_size(32);

        assert_eq!(tray.panel.icon_size(), 32);
        assert_eq!(tray.panel.with_widget(":1.4", |w| w.icon_size()), Some(32));
    }

    #[test]
    fn right_click_drains_menu_requests() {
        let (mut tray, watcher) = tray();
        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));
        let _ = tray.update(Message::MenuUpdated {
            address: ":1.4".to_string(),
            menu_items: Vec::new(),
        });

        let _ = tray.update(Message::ButtonPressed {
            address: ":1.4".to_string(),
            button: BUTTON_SECONDARY,
        });

        assert!(watcher.take_menu_requests().is_empty());
    }

    fn entry(id: i32, label: &str) -> MenuItem {
        MenuItem {
            id,
            label: label.to_string(),
            enabled: true,
            is_separator: false,
            is_checkable: false,
            is_checked: false,
            submenu: Vec::new(),
        }
    }

    fn right_click(tray: &SystemTray, address: &str) -> Vec<Message> {
        tray.panel
            .handle_press(address, &PointerEvent::new(BUTTON_SECONDARY))
            .unwrap();
        tray.requested_menus()
    }

    #[test]
    fn right_click_on_item_with_menu_opens_it() {
        let (mut tray, watcher) = tray();
        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));
        let items = vec![entry(1, "Settings"), entry(2, "Quit")];
        let _ = tray.update(Message::MenuUpdated {
            address: ":1.4".to_string(),
            menu_items: items.clone(),
        });

        let messages = right_click(&tray, ":1.4");

        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::OpenMenu { address, items: shown } => {
                assert_eq!(address, ":1.4");
                assert_eq!(shown, &items);
            }
            other => panic!("expected OpenMenu, got {other:?}"),
        }
        assert!(watcher.take_menu_requests().is_empty());
    }

    #[test]
    fn right_click_on_item_without_menu_opens_nothing() {
        let (mut tray, _watcher) = tray();
        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));
        let _ = tray.update(Message::MenuUpdated {
            address: ":1.4".to_string(),
            menu_items: Vec::new(),
        });

        let (messages, events) = capture_logs(|| right_click(&tray, ":1.4"));

        assert!(messages.is_empty());
        assert!(events
            .iter()
            .any(|e| e.level == Level::DEBUG && e.fields.contains("no menu")));
    }

    #[test]
    fn presses_carry_the_last_cursor_position() {
        let (mut tray, _watcher) = tray();
        assert_eq!(tray.pointer_event(BUTTON_PRIMARY), PointerEvent::new(BUTTON_PRIMARY));

        let _ = tray.update(Message::CursorMoved(Point::new(812.6, 14.2)));

        assert_eq!(
            tray.pointer_event(BUTTON_SECONDARY),
            PointerEvent::at(BUTTON_SECONDARY, 812, 14)
        );
    }

    #[test]
    fn hover_messages_reach_the_widget() {
        let (mut tray, _watcher) = tray();
        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));

        let _ = tray.update(Message::HoverChanged {
            address: ":1.4".to_string(),
            hovered: true,
        });
        assert_eq!(tray.panel.with_widget(":1.4", |w| w.is_hovered()), Some(true));

        let _ = tray.update(Message::HoverChanged {
            address: ":1.4".to_string(),
            hovered: false,
        });
        assert_eq!(tray.panel.with_widget(":1.4", |w| w.is_hovered()), Some(false));
    }

    #[test]
    fn failed_activation_without_client_only_warns() {
        let (mut tray, watcher) = tray();
        let _ = tray.update(Message::ItemAdded(snapshot(":1.4")));

        let (_, events) = capture_logs(|| {
            let _ = tray.update(Message::ButtonPressed {
                address: ":1.4".to_string(),
                button: BUTTON_PRIMARY,
            });
        });

        let warnings: Vec<_> = events.iter().filter(|e| e.level == Level::WARN).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].fields.contains(":1.4"));
        assert!(events.iter().all(|e| e.level != Level::ERROR));
        assert!(watcher.take_menu_requests().is_empty());
    }

    #[test]
    fn menu_click_before_connect_is_ignored() {
        let (mut tray, _watcher) = tray();

        let (_, events) = capture_logs(|| {
            let _ = tray.update(Message::MenuItemClicked {
                address: ":1.4".to_string(),
                menu_id: 3,
            });
        });

        assert!(events.iter().any(|e| e.level == Level::WARN));
    }
}
