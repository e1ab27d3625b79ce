//! Default note content

/// Id of the tab every fresh session starts with. Also the fallback
/// activation target when the active id no longer resolves.
pub const DEFAULT_TAB_ID: &str = "tab-1";

/// Body of a freshly created tab.
pub const DEFAULT_TAB_CONTENT: &str = "\
## New Tab

Start writing your markdown here...

- Add your content
- The preview updates as you type
- Share the generated link when ready
";

/// Body of the welcome tab shown on first launch.
pub const WELCOME_CONTENT: &str = "\
## Welcome to Jotter

Write markdown notes in tabs and share each one as a link.

- Everything is stored locally; a page refresh never loses progress
- Tabs with unsaved edits are marked until you save them
- Works offline

|Syntax    |Example       |
|--------- |--------------|
|emphasis  | **bold text**|
|code      | `inline`     |

```text
Code blocks are rendered too.
```

Notes stay around until you overwrite them.
";
