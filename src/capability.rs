use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Platform a document-automation backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    CrossPlatform,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::CrossPlatform => "cross_platform",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation families a backend controller may or may not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CreateDocument,
    OpenDocument,
    SaveDocument,
    SaveAsHwpx,
    SaveAsPdf,
    CloseDocument,
    InsertText,
    GetText,
    FindReplace,
    CreateTable,
    SetCellText,
    GetCellText,
    InsertPicture,
    InsertHyperlink,
    SetFont,
    SetCharshape,
    SetParashape,
    GotoPage,
    GetPageCount,
    CreateField,
    PutFieldText,
    GetFieldText,
    RunAction,
    HeaderFooter,
    GetDocumentInfo,
}

impl Capability {
    pub const ALL: [Capability; 25] = [
        Capability::CreateDocument,
        Capability::OpenDocument,
        Capability::SaveDocument,
        Capability::SaveAsHwpx,
        Capability::SaveAsPdf,
        Capability::CloseDocument,
        Capability::InsertText,
        Capability::GetText,
        Capability::FindReplace,
        Capability::CreateTable,
        Capability::SetCellText,
        Capability::GetCellText,
        Capability::InsertPicture,
        Capability::InsertHyperlink,
        Capability::SetFont,
        Capability::SetCharshape,
        Capability::SetParashape,
        Capability::GotoPage,
        Capability::GetPageCount,
        Capability::CreateField,
        Capability::PutFieldText,
        Capability::GetFieldText,
        Capability::RunAction,
        Capability::HeaderFooter,
        Capability::GetDocumentInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::CreateDocument => "create_document",
            Capability::OpenDocument => "open_document",
            Capability::SaveDocument => "save_document",
            Capability::SaveAsHwpx => "save_as_hwpx",
            Capability::SaveAsPdf => "save_as_pdf",
            Capability::CloseDocument => "close_document",
            Capability::InsertText => "insert_text",
            Capability::GetText => "get_text",
            Capability::FindReplace => "find_replace",
            Capability::CreateTable => "create_table",
            Capability::SetCellText => "set_cell_text",
            Capability::GetCellText => "get_cell_text",
            Capability::InsertPicture => "insert_picture",
            Capability::InsertHyperlink => "insert_hyperlink",
            Capability::SetFont => "set_font",
            Capability::SetCharshape => "set_charshape",
            Capability::SetParashape => "set_parashape",
            Capability::GotoPage => "goto_page",
            Capability::GetPageCount => "get_page_count",
            Capability::CreateField => "create_field",
            Capability::PutFieldText => "put_field_text",
            Capability::GetFieldText => "get_field_text",
            Capability::RunAction => "run_action",
            Capability::HeaderFooter => "header_footer",
            Capability::GetDocumentInfo => "get_document_info",
        }
    }

    /// Tool-name suffixes that identify a tool as needing this capability.
    fn tool_suffixes(self) -> &'static [&'static str] {
        match self {
            Capability::CreateDocument => &["create", "create_document"],
            Capability::OpenDocument => &["open", "open_document"],
            Capability::SaveDocument => &["save", "save_document"],
            Capability::SaveAsHwpx => &["save_as_hwpx", "create_hwpx"],
            Capability::SaveAsPdf => &["save_as_pdf", "export_pdf"],
            Capability::CloseDocument => &["close", "close_document"],
            Capability::InsertText => &["insert_text"],
            Capability::GetText => &["get_text"],
            Capability::FindReplace => &["find_replace", "find_replace_all"],
            Capability::CreateTable => &["create_table", "insert_table"],
            Capability::SetCellText => &["set_cell_text"],
            Capability::GetCellText => &["get_cell_text"],
            Capability::InsertPicture => &["insert_picture"],
            Capability::InsertHyperlink => &["insert_hyperlink"],
            Capability::SetFont => &["set_font", "set_font_style"],
            Capability::SetCharshape => &["set_charshape"],
            Capability::SetParashape => &["set_parashape"],
            Capability::GotoPage => &["goto_page"],
            Capability::GetPageCount => &["get_page_count"],
            Capability::CreateField => &["create_field"],
            Capability::PutFieldText => &["put_field_text"],
            Capability::GetFieldText => &["get_field_text"],
            Capability::RunAction => &["run_action"],
            Capability::HeaderFooter => &["header_footer_modify", "header_footer_delete"],
            Capability::GetDocumentInfo => &["get_document_info"],
        }
    }

    /// Capability a tool needs, judged by the longest matching name suffix.
    ///
    /// A suffix only matches on a `_` boundary, so `hwp_save` needs
    /// `save_document` while `hwp_autosave` needs nothing.
    pub fn for_tool_name(name: &str) -> Option<Capability> {
        let lowered = name.to_lowercase();
        let mut best: Option<(usize, Capability)> = None;
        for capability in Capability::ALL {
            for suffix in capability.tool_suffixes() {
                let Some(head) = lowered.strip_suffix(suffix) else {
                    continue;
                };
                if !(head.is_empty() || head.ends_with('_')) {
                    continue;
                }
                if best.is_none_or(|(len, _)| suffix.len() > len) {
                    best = Some((suffix.len(), capability));
                }
            }
        }
        best.map(|(_, capability)| capability)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a backend controller on a given platform can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerCapabilities {
    pub platform: Platform,
    pub capabilities: BTreeSet<Capability>,
}

impl ControllerCapabilities {
    pub fn for_platform(platform: Platform) -> Self {
        let capabilities = match platform {
            Platform::Windows => Capability::ALL.into_iter().collect(),
            Platform::CrossPlatform => [
                Capability::CreateDocument,
                Capability::SaveDocument,
                Capability::SaveAsHwpx,
                Capability::InsertText,
                Capability::CreateTable,
                Capability::InsertPicture,
                Capability::SetFont,
                Capability::GetPageCount,
                Capability::GetDocumentInfo,
            ]
            .into_iter()
            .collect(),
        };
        Self {
            platform,
            capabilities,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
