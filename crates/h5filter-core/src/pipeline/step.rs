use serde::{Deserialize, Serialize};

use crate::types::{COMMON_CD_VALUES, FilterFlags, FilterId};

/// Client data words attached to a filter step.
///
/// Short arrays live inline in the step; longer ones own a heap slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientData {
    Inline {
        len: u8,
        values: [u32; COMMON_CD_VALUES],
    },
    Heap(Box<[u32]>),
}

impl Default for ClientData {
    fn default() -> Self {
        Self::Inline {
            len: 0,
            values: [0; COMMON_CD_VALUES],
        }
    }
}

impl ClientData {
    pub fn new(values: &[u32]) -> Self {
        if values.len() <= COMMON_CD_VALUES {
            let mut inline = [0; COMMON_CD_VALUES];
            inline[..values.len()].copy_from_slice(values);
            Self::Inline {
                len: values.len() as u8,
                values: inline,
            }
        } else {
            Self::Heap(values.into())
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        match self {
            Self::Inline { len, values } => &values[..usize::from(*len)],
            Self::Heap(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

impl From<&[u32]> for ClientData {
    fn from(values: &[u32]) -> Self {
        Self::new(values)
    }
}

/// One entry of a [`super::FilterPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStep {
    id: FilterId,
    flags: FilterFlags,
    name: Option<String>,
    client_data: ClientData,
}

impl FilterStep {
    pub fn new(id: FilterId, flags: FilterFlags, client_data: &[u32]) -> Self {
        Self {
            id,
            flags,
            name: None,
            client_data: ClientData::new(client_data),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn flags(&self) -> FilterFlags {
        self.flags
    }

    pub fn is_optional(&self) -> bool {
        self.flags.is_optional()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn client_data(&self) -> &[u32] {
        self.client_data.as_slice()
    }

    pub fn client_data_storage(&self) -> &ClientData {
        &self.client_data
    }

    /// Replaces the step's per-dataset parameters.
    pub fn set_client_data(&mut self, values: &[u32]) {
        self.client_data = ClientData::new(values);
    }

    pub(crate) fn set_flags(&mut self, flags: FilterFlags) {
        self.flags = flags;
    }
}
