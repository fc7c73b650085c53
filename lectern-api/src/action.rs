use crate::{ContentKind, Error, Event, ItemId, NewItem};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub enum Action {
    NewItem(NewItem),
    NewEvent(Event),
    DeleteItem(ContentKind, ItemId),
}

impl Action {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Action::NewItem(i) => i.validate(),
            Action::NewEvent(e) => e.validate(),
            Action::DeleteItem(_, _) => Ok(()),
        }
    }
}
