use uuid::Uuid;

use crate::activity::FeedScope;
use crate::error::AppError;
use crate::fleet::{VehicleDraft, VehicleType};
use crate::identity::{Identity, Role};

pub const HELP: &str = "\
Commands:
  signup <email> <password> <name> [user|admin]   create an account and sign in
  login <email> <password>                        sign in
  logout                                          sign out
  whoami                                          show the signed-in profile
  refresh                                         refresh the session token
  feed [admin|user] [page]                        activity feed (admins default to everyone)
  vehicles                                        list vehicles
  add-vehicle <make> <model> <year> <type>        register a vehicle
  edit-vehicle <id> <make> <model> <year> <type>  change a vehicle
  rm-vehicle <id>                                 delete a vehicle
  users                                           list users (admin)
  edit-user <id> <name> <email>                   change a profile's name and email
  set-role <id> <user|admin>                      change a user's role (admin)
  rm-user <id>                                    delete a user and their vehicles (admin)
  help                                            show this help
  quit | exit                                     leave the shell
Quote arguments containing spaces: signup a@x.com secret \"Ada Lovelace\"";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Help,
    SignUp { email: String, password: String, name: String, role: Role },
    Login { email: String, password: String },
    Logout,
    WhoAmI,
    Refresh,
    Feed { scope: Option<FeedScope>, page: u32 },
    Vehicles,
    AddVehicle(VehicleDraft),
    EditVehicle { id: Uuid, draft: VehicleDraft },
    RemoveVehicle(Uuid),
    Users,
    EditUser { id: Identity, name: String, email: String },
    SetRole { id: Identity, role: Role },
    RemoveUser(Identity),
    Quit,
}

fn usage(text: &str) -> AppError { AppError::user("usage", text) }

/// Whitespace-separated words; double quotes group words.
pub fn tokenize(line: &str) -> Result<Vec<String>, AppError> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    out.push(std::mem::take(&mut cur));
                    has_token = false;
                }
            }
            c => {
                cur.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err(usage("unterminated quote"));
    }
    if has_token {
        out.push(cur);
    }
    Ok(out)
}

fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s).map_err(|_| AppError::user("invalid_id".to_string(), format!("'{}' is not a vehicle id", s)))
}

fn parse_role(s: &str) -> Result<Role, AppError> { s.parse::<Role>().map_err(|e| AppError::user("invalid_role".to_string(), e)) }

fn parse_draft(args: &[String]) -> Result<VehicleDraft, AppError> {
    let [make, model, year, kind] = args else {
        return Err(usage("expected <make> <model> <year> <type>"));
    };
    let year: i32 = year
        .parse()
        .map_err(|_| AppError::user("invalid_year".to_string(), format!("'{}' is not a year", year)))?;
    let vehicle_type: VehicleType = kind.parse().map_err(|e| AppError::user("invalid_type".to_string(), e))?;
    Ok(VehicleDraft::new(make.clone(), model.clone(), year, vehicle_type))
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, AppError> {
        let words = tokenize(line)?;
        let Some((head, args)) = words.split_first() else {
            return Ok(Command::Empty);
        };
        let cmd = match (head.to_ascii_lowercase().as_str(), args) {
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            ("signup", [email, password, name]) => {
                Command::SignUp { email: email.clone(), password: password.clone(), name: name.clone(), role: Role::User }
            }
            ("signup", [email, password, name, role]) => {
                Command::SignUp { email: email.clone(), password: password.clone(), name: name.clone(), role: parse_role(role)? }
            }
            ("signup", _) => return Err(usage("signup <email> <password> <name> [user|admin]")),
            ("login", [email, password]) => Command::Login { email: email.clone(), password: password.clone() },
            ("login", _) => return Err(usage("login <email> <password>")),
            ("logout", []) => Command::Logout,
            ("whoami", []) => Command::WhoAmI,
            ("refresh", []) => Command::Refresh,
            ("feed", rest) if rest.len() <= 2 => {
                let mut scope = None;
                let mut page = 1;
                for arg in rest {
                    if let Ok(n) = arg.parse::<u32>() {
                        page = n;
                    } else {
                        scope = Some(arg.parse::<FeedScope>().map_err(|e| AppError::user("invalid_scope".to_string(), e))?);
                    }
                }
                Command::Feed { scope, page }
            }
            ("feed", _) => return Err(usage("feed [admin|user] [page]")),
            ("vehicles", []) => Command::Vehicles,
            ("add-vehicle", rest) => Command::AddVehicle(parse_draft(rest)?),
            ("edit-vehicle", [id, rest @ ..]) => Command::EditVehicle { id: parse_uuid(id)?, draft: parse_draft(rest)? },
            ("edit-vehicle", _) => return Err(usage("edit-vehicle <id> <make> <model> <year> <type>")),
            ("rm-vehicle", [id]) => Command::RemoveVehicle(parse_uuid(id)?),
            ("users", []) => Command::Users,
            ("edit-user", [id, name, email]) => Command::EditUser { id: Identity::new(id.as_str()), name: name.clone(), email: email.clone() },
            ("set-role", [id, role]) => Command::SetRole { id: Identity::new(id.as_str()), role: parse_role(role)? },
            ("rm-user", [id]) => Command::RemoveUser(Identity::new(id.as_str())),
            (other, _) => {
                return Err(AppError::user("unknown_command".to_string(), format!("unknown command or arguments: '{}' (try help)", other)))
            }
        };
        Ok(cmd)
    }
}
