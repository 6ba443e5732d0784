//! Console menu.
//!
//! Lines typed by the user are turned into [`ControlCommand`]s here; the
//! session applies them. The menu itself never touches audio state.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// Interpolation disabled; only the resampled grid is heard.
    Offline,
    /// Interpolation can be switched while the source moves.
    Online,
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestMode::Offline => write!(f, "offline interpolation"),
            TestMode::Online => write!(f, "online interpolation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    ExportGrid,
    StartTest(TestMode),
    StopTest,
    SetInterpolation(bool),
    ChangeResamplingStep(f32),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuReply {
    Command(ControlCommand),
    /// The line was accepted; more input is needed.
    Prompt,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuState {
    Main,
    Test(TestMode),
    AwaitStep(TestMode),
}

#[derive(Debug)]
pub struct Menu {
    state: MenuState,
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

impl Menu {
    pub fn new() -> Self {
        Self {
            state: MenuState::Main,
        }
    }

    pub fn handle_line(&mut self, line: &str) -> MenuReply {
        let answer = line.trim();
        let (reply, next) = match self.state {
            MenuState::Main => match answer {
                "0" => (MenuReply::Command(ControlCommand::ExportGrid), MenuState::Main),
                "1" => (
                    MenuReply::Command(ControlCommand::StartTest(TestMode::Offline)),
                    MenuState::Test(TestMode::Offline),
                ),
                "2" => (
                    MenuReply::Command(ControlCommand::StartTest(TestMode::Online)),
                    MenuState::Test(TestMode::Online),
                ),
                "-1" => (MenuReply::Command(ControlCommand::Quit), MenuState::Main),
                _ => (MenuReply::Invalid, MenuState::Main),
            },
            MenuState::Test(TestMode::Offline) => match answer {
                "0" => (MenuReply::Prompt, MenuState::AwaitStep(TestMode::Offline)),
                "-1" => (MenuReply::Command(ControlCommand::StopTest), MenuState::Main),
                _ => (MenuReply::Invalid, self.state),
            },
            MenuState::Test(TestMode::Online) => match answer {
                "0" => (
                    MenuReply::Command(ControlCommand::SetInterpolation(false)),
                    self.state,
                ),
                "1" => (
                    MenuReply::Command(ControlCommand::SetInterpolation(true)),
                    self.state,
                ),
                "2" => (MenuReply::Prompt, MenuState::AwaitStep(TestMode::Online)),
                "-1" => (MenuReply::Command(ControlCommand::StopTest), MenuState::Main),
                _ => (MenuReply::Invalid, self.state),
            },
            MenuState::AwaitStep(mode) => match answer.parse::<f32>() {
                Ok(step) if step.is_finite() && step > 0.0 => (
                    MenuReply::Command(ControlCommand::ChangeResamplingStep(step)),
                    MenuState::Test(mode),
                ),
                _ => (MenuReply::Invalid, self.state),
            },
        };
        self.state = next;
        reply
    }

    /// Text to show before reading the next line.
    pub fn prompt(&self, resampling_step: f32) -> String {
        match self.state {
            MenuState::Main => [
                "",
                "           Choose which test you want to run:",
                "---------------------------------------------------------------------",
                "0:  Write the HRTF grid orientations to a .csv file.",
                "1:  Test offline interpolation (resampled grid only).",
                "2:  Test online interpolation.",
                "-1: Exit.",
                "",
            ]
            .join("\n"),
            MenuState::Test(TestMode::Offline) => [
                "",
                "0:  Change the resampling step.",
                "-1: Exit the test.",
                "",
            ]
            .join("\n"),
            MenuState::Test(TestMode::Online) => [
                "",
                "0:  Disable online interpolation.",
                "1:  Enable online interpolation.",
                "2:  Change the resampling step.",
                "-1: Exit the test.",
                "",
            ]
            .join("\n"),
            MenuState::AwaitStep(_) => format!(
                "Enter the desired resampling step, currently set to {resampling_step}: "
            ),
        }
    }

    pub fn in_test(&self) -> Option<TestMode> {
        match self.state {
            MenuState::Main => None,
            MenuState::Test(mode) | MenuState::AwaitStep(mode) => Some(mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(reply: MenuReply) -> ControlCommand {
        match reply {
            MenuReply::Command(command) => command,
            other => panic!("expected a command, got {other:?}"),
        }
    }

    #[test]
    fn main_menu_choices() {
        let mut menu = Menu::new();
        assert_eq!(command(menu.handle_line("0\n")), ControlCommand::ExportGrid);
        assert_eq!(menu.in_test(), None);
        assert_eq!(menu.handle_line("7"), MenuReply::Invalid);
        assert_eq!(menu.handle_line("abc"), MenuReply::Invalid);
        assert_eq!(command(menu.handle_line(" -1 ")), ControlCommand::Quit);
    }

    #[test]
    fn offline_test_flow() {
        let mut menu = Menu::new();
        assert_eq!(
            command(menu.handle_line("1")),
            ControlCommand::StartTest(TestMode::Offline)
        );
        assert_eq!(menu.in_test(), Some(TestMode::Offline));

        // Interpolation toggles are not offered offline.
        assert_eq!(menu.handle_line("1"), MenuReply::Invalid);

        assert_eq!(menu.handle_line("0"), MenuReply::Prompt);
        assert!(menu.prompt(15.0).contains("currently set to 15"));
        assert_eq!(menu.handle_line("0"), MenuReply::Invalid);
        assert_eq!(menu.handle_line("-3"), MenuReply::Invalid);
        assert_eq!(
            command(menu.handle_line("7.5")),
            ControlCommand::ChangeResamplingStep(7.5)
        );
        assert_eq!(menu.in_test(), Some(TestMode::Offline));

        assert_eq!(command(menu.handle_line("-1")), ControlCommand::StopTest);
        assert_eq!(menu.in_test(), None);
    }

    #[test]
    fn online_test_flow() {
        let mut menu = Menu::new();
        command(menu.handle_line("2"));
        assert_eq!(
            command(menu.handle_line("0")),
            ControlCommand::SetInterpolation(false)
        );
        assert_eq!(
            command(menu.handle_line("1")),
            ControlCommand::SetInterpolation(true)
        );
        assert_eq!(menu.handle_line("2"), MenuReply::Prompt);
        assert_eq!(
            command(menu.handle_line("30")),
            ControlCommand::ChangeResamplingStep(30.0)
        );
        assert_eq!(menu.in_test(), Some(TestMode::Online));
        assert_eq!(command(menu.handle_line("-1")), ControlCommand::StopTest);
    }

    #[test]
    fn step_prompt_rejects_non_finite_values() {
        let mut menu = Menu::new();
        menu.handle_line("2");
        menu.handle_line("2");
        assert_eq!(menu.handle_line("inf"), MenuReply::Invalid);
        assert_eq!(menu.handle_line("NaN"), MenuReply::Invalid);
        assert_eq!(menu.in_test(), Some(TestMode::Online));
    }
}
