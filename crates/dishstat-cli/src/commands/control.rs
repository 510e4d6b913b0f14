use std::path::Path;

/// Minutes in a day; sleep windows are expressed within it.
const DAY_MINUTES: u32 = 24 * 60;

/// A one-shot command sent to the dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Reboot,
    Stow,
    Unstow,
    Sleep {
        start_minutes: u32,
        duration_minutes: u32,
        enable: bool,
    },
}

impl Action {
    fn validate(self) -> Result<(), String> {
        if let Action::Sleep {
            start_minutes,
            duration_minutes,
            enable: true,
        } = self
        {
            if start_minutes >= DAY_MINUTES {
                return Err(format!("sleep start must be below {DAY_MINUTES} minutes"));
            }
            if duration_minutes == 0 || duration_minutes > DAY_MINUTES {
                return Err(format!(
                    "sleep duration must be between 1 and {DAY_MINUTES} minutes"
                ));
            }
        }
        Ok(())
    }

    fn describe(self) -> &'static str {
        match self {
            Action::Reboot => "reboot",
            Action::Stow => "stow",
            Action::Unstow => "unstow",
            Action::Sleep { enable: true, .. } => "sleep schedule set",
            Action::Sleep { enable: false, .. } => "sleep schedule disabled",
        }
    }
}

pub fn run(action: Action, target: Option<&str>, replay: Option<&Path>) {
    if let Err(e) = action.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let mut gateway = super::make_gateway(target, replay);
    let result = match action {
        Action::Reboot => gateway.reboot(),
        Action::Stow => gateway.set_stow_state(false),
        Action::Unstow => gateway.set_stow_state(true),
        Action::Sleep {
            start_minutes,
            duration_minutes,
            enable,
        } => gateway.set_sleep_config(start_minutes, duration_minutes, enable),
    };
    gateway.close();

    match result {
        Ok(()) => log::info!("{} sent to {}", action.describe(), gateway.target()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
