use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::{sync::Arc, time::Duration};
use textwrap::wrap;
use tui_input::{backend::crossterm::EventHandler, Input};

use tutorlink::chat::CurrentUser;
use tutorlink::directory::DirectoryCache;
use tutorlink::models::{Conversation, Message, MessageId, TutorProfile, UserId};
use tutorlink::tutors::{TutorFilters, TutorSort};

// Export types needed by main module
pub use ratatui::backend::CrosstermBackend;
pub use ratatui::Terminal;

/// Seconds before a transient banner disappears on its own.
const BANNER_TIMEOUT_SECS: i64 = 5;

/// What the event loop should do in response to a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Quit,
    /// Enter the chat view for this counterparty (starts polling).
    OpenConversation(UserId),
    /// Leave the chat view (stops polling).
    LeaveChat,
    SendMessage { counterparty: UserId, content: String },
}

enum Tab {
    Conversations,
    Chat,
    Tutors,
}

enum TutorFilterField {
    Name,
    Subject,
}

pub struct ChatUI {
    user: CurrentUser,
    directory: Arc<DirectoryCache>,
    active_tab: Tab,

    // Conversation list state (left panel, fed by the store)
    conversations: Vec<(UserId, Conversation)>,
    selected_conversation: usize,
    total_unread: usize,

    // Chat view state
    active_counterparty: Option<UserId>,
    chat: Option<Conversation>,
    input: Input,

    // Tutor browser state
    tutors: Vec<TutorProfile>,
    visible_tutors: Vec<TutorProfile>,
    tutor_filters: TutorFilters,
    tutor_sort: TutorSort,
    tutor_filter_field: TutorFilterField,
    filter_input: Input,
    selected_tutor: usize,

    banner: Option<(String, chrono::DateTime<chrono::Utc>)>,
}

impl ChatUI {
    pub fn new(user: CurrentUser, directory: Arc<DirectoryCache>) -> Self {
        ChatUI {
            user,
            directory,
            active_tab: Tab::Conversations,
            conversations: Vec::new(),
            selected_conversation: 0,
            total_unread: 0,
            active_counterparty: None,
            chat: None,
            input: Input::default(),
            tutors: Vec::new(),
            visible_tutors: Vec::new(),
            tutor_filters: TutorFilters::default(),
            tutor_sort: TutorSort::Recommended,
            tutor_filter_field: TutorFilterField::Name,
            filter_input: Input::default(),
            selected_tutor: 0,
            banner: None,
        }
    }

    /// Replace the rendered conversation list with a fresh store snapshot.
    pub fn set_conversations(&mut self, conversations: Vec<(UserId, Conversation)>, total_unread: usize) {
        self.conversations = conversations;
        self.total_unread = total_unread;
        if self.selected_conversation >= self.conversations.len() {
            self.selected_conversation = self.conversations.len().saturating_sub(1);
        }
    }

    /// Replace the open chat's message snapshot.
    pub fn set_chat(&mut self, conversation: Option<Conversation>) {
        self.chat = conversation;
    }

    pub fn set_tutors(&mut self, tutors: Vec<TutorProfile>) {
        self.tutors = tutors;
        self.apply_tutor_search();
    }

    pub fn active_counterparty(&self) -> Option<UserId> {
        self.active_counterparty
    }

    /// Show a transient banner; it auto-dismisses after a few seconds.
    pub fn show_banner(&mut self, text: &str) {
        self.banner = Some((text.to_string(), chrono::Utc::now()));
    }

    /// Drop the banner once it has been on screen long enough.
    pub fn clean_banner(&mut self) {
        if let Some((_, shown_at)) = &self.banner {
            if (chrono::Utc::now() - *shown_at).num_seconds() > BANNER_TIMEOUT_SECS {
                self.banner = None;
            }
        }
    }

    fn display_name(&self, counterparty: UserId) -> String {
        self.directory.display_name(counterparty)
    }

    fn apply_tutor_search(&mut self) {
        self.visible_tutors =
            tutorlink::tutors::search(&self.tutors, &self.tutor_filters, self.tutor_sort);
        if self.selected_tutor >= self.visible_tutors.len() {
            self.selected_tutor = self.visible_tutors.len().saturating_sub(1);
        }
    }

    fn update_filter_from_input(&mut self) {
        let value = self.filter_input.value().to_string();
        let value = if value.trim().is_empty() { None } else { Some(value) };
        match self.tutor_filter_field {
            TutorFilterField::Name => self.tutor_filters.name = value,
            TutorFilterField::Subject => self.tutor_filters.subject = value,
        }
        self.apply_tutor_search();
    }

    pub fn handle_input(&mut self) -> Result<Option<UiAction>> {
        if !event::poll(Duration::from_millis(10))? {
            return Ok(None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }

        match self.active_tab {
            Tab::Conversations => self.handle_conversations_key(key.code),
            Tab::Chat => self.handle_chat_key(key),
            Tab::Tutors => self.handle_tutors_key(key),
        }
    }

    fn handle_conversations_key(&mut self, code: KeyCode) -> Result<Option<UiAction>> {
        match code {
            KeyCode::Esc => return Ok(Some(UiAction::Quit)),
            KeyCode::Tab => self.active_tab = Tab::Tutors,
            KeyCode::Up => {
                if !self.conversations.is_empty() {
                    self.selected_conversation = self
                        .selected_conversation
                        .checked_sub(1)
                        .unwrap_or(self.conversations.len() - 1);
                }
            }
            KeyCode::Down => {
                if !self.conversations.is_empty() {
                    self.selected_conversation =
                        (self.selected_conversation + 1) % self.conversations.len();
                }
            }
            KeyCode::Enter => {
                if let Some((counterparty, _)) = self.conversations.get(self.selected_conversation)
                {
                    let counterparty = *counterparty;
                    self.active_counterparty = Some(counterparty);
                    self.active_tab = Tab::Chat;
                    self.input = Input::default();
                    return Ok(Some(UiAction::OpenConversation(counterparty)));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_chat_key(&mut self, key: event::KeyEvent) -> Result<Option<UiAction>> {
        match key.code {
            KeyCode::Esc => {
                self.active_tab = Tab::Conversations;
                self.active_counterparty = None;
                self.chat = None;
                return Ok(Some(UiAction::LeaveChat));
            }
            KeyCode::Enter => {
                if let Some(counterparty) = self.active_counterparty {
                    let content = self.input.value().trim().to_string();
                    if !content.is_empty() {
                        // Clear the input immediately; the optimistic store
                        // update makes the message itself appear at once.
                        self.input = Input::default();
                        return Ok(Some(UiAction::SendMessage {
                            counterparty,
                            content,
                        }));
                    }
                }
            }
            _ => {
                self.input.handle_event(&Event::Key(key));
            }
        }
        Ok(None)
    }

    fn handle_tutors_key(&mut self, key: event::KeyEvent) -> Result<Option<UiAction>> {
        match key.code {
            KeyCode::Esc => return Ok(Some(UiAction::Quit)),
            KeyCode::Tab => self.active_tab = Tab::Conversations,
            KeyCode::Up => {
                if !self.visible_tutors.is_empty() {
                    self.selected_tutor = self
                        .selected_tutor
                        .checked_sub(1)
                        .unwrap_or(self.visible_tutors.len() - 1);
                }
            }
            KeyCode::Down => {
                if !self.visible_tutors.is_empty() {
                    self.selected_tutor = (self.selected_tutor + 1) % self.visible_tutors.len();
                }
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.tutor_sort = self.tutor_sort.next();
                self.apply_tutor_search();
            }
            KeyCode::Char('f') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.tutor_filter_field = match self.tutor_filter_field {
                    TutorFilterField::Name => TutorFilterField::Subject,
                    TutorFilterField::Subject => TutorFilterField::Name,
                };
                self.filter_input = Input::default();
                self.update_filter_from_input();
            }
            _ => {
                self.filter_input.handle_event(&Event::Key(key));
                self.update_filter_from_input();
            }
        }
        Ok(None)
    }

    pub fn draw<B: Backend>(&mut self, frame: &mut Frame<B>) {
        let size = frame.size();

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(30), // Conversations panel
                Constraint::Percentage(70), // Chat / tutors panel
            ])
            .split(size);

        self.draw_conversation_list(frame, chunks[0]);

        match self.active_tab {
            Tab::Tutors => self.draw_tutors(frame, chunks[1]),
            _ => self.draw_chat(frame, chunks[1]),
        }
    }

    fn draw_conversation_list<B: Backend>(&mut self, frame: &mut Frame<B>, area: Rect) {
        let items: Vec<ListItem> = self
            .conversations
            .iter()
            .enumerate()
            .map(|(i, (counterparty, conversation))| {
                let name = self.directory.display_name(*counterparty);
                let marker = if i == self.selected_conversation { "> " } else { "  " };
                let unread = if conversation.unread_count > 0 {
                    format!(" ({})", conversation.unread_count)
                } else {
                    String::new()
                };
                let preview = conversation
                    .last_message
                    .as_ref()
                    .map(|m| m.content.clone())
                    .unwrap_or_else(|| "No messages yet".to_string());
                let line = format!("{}{}{} - {}", marker, name, unread, preview);
                let style = if conversation.unread_count > 0 {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(line).style(style)
            })
            .collect();

        let title = if self.total_unread > 0 {
            format!("Conversations ({} unread)", self.total_unread)
        } else {
            "Conversations".to_string()
        };
        let list = List::new(items).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(match self.active_tab {
                    Tab::Conversations => Style::default().fg(Color::Yellow),
                    _ => Style::default(),
                }),
        );
        frame.render_widget(list, area);
    }

    fn draw_chat<B: Backend>(&mut self, frame: &mut Frame<B>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // Messages area
                Constraint::Length(3), // Input box
                Constraint::Length(1), // Help line
            ])
            .split(area);

        let counterparty_name = self
            .active_counterparty
            .map(|cp| self.display_name(cp))
            .unwrap_or_else(|| "Select a conversation".to_string());

        let messages = self
            .chat
            .as_ref()
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        draw_messages(
            frame,
            &messages,
            chunks[0],
            self.user.id,
            &counterparty_name,
        );

        let input_widget = Paragraph::new(self.input.value()).block(
            Block::default()
                .title("Message")
                .borders(Borders::ALL)
                .border_style(match self.active_tab {
                    Tab::Chat => Style::default().fg(Color::Yellow),
                    _ => Style::default(),
                }),
        );
        frame.render_widget(input_widget, chunks[1]);

        let help = match &self.banner {
            Some((text, _)) => Paragraph::new(Line::from(Span::styled(
                text.clone(),
                Style::default().fg(Color::Red),
            ))),
            None => Paragraph::new(Line::from(Span::styled(
                "ESC back | TAB tutors | Enter send",
                Style::default().fg(Color::Gray),
            ))),
        };
        frame.render_widget(help, chunks[2]);

        if let Tab::Chat = self.active_tab {
            frame.set_cursor(
                chunks[1].x + self.input.cursor() as u16 + 1,
                chunks[1].y + 1,
            );
        }
    }

    fn draw_tutors<B: Backend>(&mut self, frame: &mut Frame<B>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // Tutor list
                Constraint::Length(3), // Filter input
                Constraint::Length(1), // Help line
            ])
            .split(area);

        let items: Vec<ListItem> = self
            .visible_tutors
            .iter()
            .enumerate()
            .map(|(i, tutor)| {
                let marker = if i == self.selected_tutor { "> " } else { "  " };
                let subjects = tutor
                    .subjects
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let rating = tutor
                    .average_rating
                    .map(|r| format!("{:.1}", r))
                    .unwrap_or_else(|| "-".to_string());
                let subjects = if subjects.is_empty() {
                    "no subjects".to_string()
                } else {
                    subjects
                };
                let line = format!(
                    "{}{} | {} | {} stars | ${:.0}/hour | {} years",
                    marker,
                    tutor.display_name(),
                    subjects,
                    rating,
                    tutor.lead_hourly_rate(),
                    tutor.years_of_experience.unwrap_or(0),
                );
                ListItem::new(line)
            })
            .collect();

        let title = format!(
            "Tutors ({} of {}) - sort: {}",
            self.visible_tutors.len(),
            self.tutors.len(),
            self.tutor_sort.label()
        );
        let mut list_state = ListState::default();
        if !self.visible_tutors.is_empty() {
            list_state.select(Some(self.selected_tutor));
        }
        let list = List::new(items).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
        frame.render_stateful_widget(list, chunks[0], &mut list_state);

        let field_label = match self.tutor_filter_field {
            TutorFilterField::Name => "Filter by name",
            TutorFilterField::Subject => "Filter by subject",
        };
        let filter_widget = Paragraph::new(self.filter_input.value())
            .block(Block::default().title(field_label).borders(Borders::ALL));
        frame.render_widget(filter_widget, chunks[1]);

        let help = Paragraph::new(Line::from(Span::styled(
            "ESC quit | TAB conversations | Ctrl+S sort | Ctrl+F filter field",
            Style::default().fg(Color::Gray),
        )));
        frame.render_widget(help, chunks[2]);

        frame.set_cursor(
            chunks[1].x + self.filter_input.cursor() as u16 + 1,
            chunks[1].y + 1,
        );
    }
}

fn draw_messages<B: Backend>(
    f: &mut Frame<B>,
    messages: &[Message],
    area: Rect,
    current_user: UserId,
    counterparty_name: &str,
) {
    let wrap_width = area.width.saturating_sub(2) as usize; // Account for borders

    let items: Vec<ListItem> = messages
        .iter()
        .flat_map(|m| {
            let timestamp = m.sent_at.format("%Y-%m-%d %H:%M").to_string();
            let own = !m.is_incoming(current_user);

            let prefix = if own {
                format!("[{}] You: ", timestamp)
            } else {
                format!("[{}] {}: ", timestamp, counterparty_name)
            };

            // Own messages carry a delivery marker; incoming ones a read one
            let status_indicator = if own {
                match m.id {
                    MessageId::Pending(_) => " ...",
                    MessageId::Confirmed(_) => " [ok]",
                }
            } else if !m.is_read {
                " (new)"
            } else {
                ""
            };

            let full_content = format!("{}{}{}", prefix, m.content, status_indicator);
            let wrapped_lines: Vec<String> = wrap(&full_content, wrap_width.max(1))
                .into_iter()
                .map(|l| l.into_owned())
                .collect();

            let style = if own {
                match m.id {
                    MessageId::Pending(_) => Style::default().fg(Color::Blue),
                    MessageId::Confirmed(_) => Style::default().fg(Color::Green),
                }
            } else {
                Style::default()
            };

            wrapped_lines
                .into_iter()
                .map(move |line| ListItem::new(Text::from(line)).style(style))
        })
        .collect();

    // Keep the view pinned to the newest message
    let mut list_state = ListState::default();
    if !items.is_empty() {
        list_state.select(Some(items.len() - 1));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Chat with {}", counterparty_name)),
        )
        .highlight_style(Style::default());
    f.render_stateful_widget(list, area, &mut list_state);
}
