mod components;
mod config;
mod popup;
mod styles;
mod theme;

use iced::event::{self, Event};
use iced::keyboard::{self, key::Named};
use iced::widget::{container, horizontal_space, row, text};
use iced::window::Id;
use iced::{Border, Element, Font, Length, Subscription, Task};
use iced_layershell::actions::{IcedNewMenuSettings, MenuDirection};
use iced_layershell::build_pattern::{daemon, MainSettings};
use iced_layershell::reexport::{Anchor, Layer};
use iced_layershell::settings::LayerShellSettings;
use iced_layershell::to_layer_message;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigMessage};
use crate::popup::{MenuPopup, MenuPopups};
use crate::theme::AppTheme;
use components::system_tray::{self, menu};

pub fn main() -> Result<(), iced_layershell::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("starting traybar");

    daemon(
        StatusBar::namespace,
        StatusBar::update,
        StatusBar::view,
        StatusBar::remove_id,
    )
    .subscription(StatusBar::subscription)
    .theme(StatusBar::theme)
    .settings(MainSettings {
        layer_settings: LayerShellSettings {
            anchor: Anchor::Top | Anchor::Left | Anchor::Right,
            layer: Layer::Top,
            exclusive_zone: 36,
            size: Some((0, 36)),
            margin: (4, 4, 15, 4),
            ..LayerShellSettings::default()
        },
        default_font: Font::with_name("IBM Plex Mono"),
        antialiasing: true,
        ..MainSettings::default()
    })
    .run_with(StatusBar::new)
}

struct StatusBar {
    app_theme: AppTheme,
    system_tray: system_tray::SystemTray,
    popups: MenuPopups,
}

#[to_layer_message(multi)]
#[derive(Debug, Clone)]
enum Message {
    SystemTray(system_tray::Message),
    Config(ConfigMessage),
    ShowMenu {
        address: String,
        items: Vec<menu::MenuItem>,
    },
    ClosePopup(Id),
    MenuEntryChosen {
        popup_id: Id,
        address: String,
        menu_id: i32,
    },
    /// Window events, watched for Escape
    IcedEvent(Event),
}

impl StatusBar {
    fn new() -> (Self, Task<Message>) {
        let config = Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load config, using defaults");
            Config::default()
        });

        let app_theme = AppTheme::from(&config);
        let mut system_tray = system_tray::SystemTray::new(config.tray.icon_size);
        system_tray.set_style(app_theme.item_style(), app_theme.spacing());

        (
            Self {
                app_theme,
                system_tray,
                popups: MenuPopups::default(),
            },
            Task::none(),
        )
    }

    fn namespace(&self) -> String {
        String::from("traybar")
    }

    fn theme(&self) -> iced::Theme {
        self.app_theme.into()
    }

    fn remove_id(&mut self, id: Id) {
        self.popups.forget(id);
    }

    fn apply_config(&mut self, config: Config) {
        self.app_theme = AppTheme::from(&config);
        self.system_tray
            .set_style(self.app_theme.item_style(), self.app_theme.spacing());
        self.system_tray.set_icon_size(config.tray.icon_size);
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::SystemTray(system_tray::Message::OpenMenu { address, items }) => {
                Task::done(Message::ShowMenu { address, items })
            }
            Message::SystemTray(msg) => self.system_tray.update(msg).map(Message::SystemTray),
            Message::Config(ConfigMessage::Reloaded(config)) => {
                info!("config reloaded");
                self.apply_config(config);
                Task::none()
            }
            Message::Config(ConfigMessage::Error(e)) => {
                warn!(error = %e, "config watcher");
                Task::none()
            }
            Message::ShowMenu { address, items } => {
                let settings = IcedNewMenuSettings {
                    size: (popup::WIDTH, popup::height_for(&items)),
                    direction: MenuDirection::Down,
                };
                let (id, stale) = self.popups.open(address, items);

                let mut tasks: Vec<Task<Message>> = stale
                    .into_iter()
                    .map(|id| Task::done(Message::ClosePopup(id)))
                    .collect();
                tasks.push(Task::done(Message::NewMenu { settings, id }));
                Task::batch(tasks)
            }
            Message::ClosePopup(id) => {
                self.popups.forget(id);
                Task::done(Message::RemoveWindow(id))
            }
            Message::MenuEntryChosen {
                popup_id,
                address,
                menu_id,
            } => {
                let activate = self
                    .system_tray
                    .update(system_tray::Message::MenuItemClicked { address, menu_id })
                    .map(Message::SystemTray);
                Task::batch([Task::done(Message::ClosePopup(popup_id)), activate])
            }
            Message::IcedEvent(Event::Keyboard(keyboard::Event::KeyPressed {
                key: keyboard::Key::Named(Named::Escape),
                ..
            })) => match self.popups.any() {
                Some(id) => Task::done(Message::ClosePopup(id)),
                None => Task::none(),
            },
            // Other window events and layer-shell requests
            _ => Task::none(),
        }
    }

    fn view(&self, id: Id) -> Element<'_, Message> {
        match self.popups.get(id) {
            Some(popup) => self.view_menu_popup(id, popup),
            None => self.view_main(),
        }
    }

    fn view_main(&self) -> Element<'_, Message> {
        let tray = self.system_tray.view().map(Message::SystemTray);

        let content = row![horizontal_space(), tray]
            .padding(5)
            .align_y(iced::Alignment::Center)
            .width(Length::Fill);

        let background = self.app_theme.background();
        let accent = self.app_theme.accent();

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(move |_theme| {
                container::Style {
                    background: Some(background.into()),
                    border: Border {
                        radius: 15.0.into(),
                        width: 1.0,
                        color: accent,
                    },
                    ..container::Style::default()
                }
            })
            .into()
    }

    fn view_menu_popup<'a>(&'a self, popup_id: Id, popup: &'a MenuPopup) -> Element<'a, Message> {
        if popup.items.is_empty() {
            return container(text("No menu entries"))
                .width(Length::Fill)
                .height(Length::Fill)
                .into();
        }

        let address = popup.address.clone();
        menu::render_menu(&popup.items, self.app_theme.menu_palette(), move |menu_id| {
            Message::MenuEntryChosen {
                popup_id,
                address: address.clone(),
                menu_id,
            }
        })
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch(vec![
            self.system_tray.subscription().map(Message::SystemTray),
            config::config_subscription().map(Message::Config),
            event::listen().map(Message::IcedEvent),
        ])
    }
}
