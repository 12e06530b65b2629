//! Remote build script generation
//!
//! The task bundle carries a batch file that runs on the peer from inside the
//! extracted bundle directory. The toolchain bundle is extracted next to it
//! under [`TOOLCHAIN_DIR`].

use regex_lite::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Name of the generated script inside the task bundle
pub const SCRIPT_NAME: &str = "golembuild.bat";

/// Directory the remote compilers write objects and PDBs into
pub const OUTPUT_DIR: &str = "output";

/// Archive of [`OUTPUT_DIR`] uploaded back to the delivery endpoint
pub const OUTPUT_ARCHIVE: &str = "output.zip";

/// Session-relative directory holding the extracted toolchain
pub const TOOLCHAIN_DIR: &str = "toolchain";

const PDB_SERVER: &str = "mspdbsrv.exe";

fn pch_flag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\s*/(?:Yu|Yc|Fp)(?:"[^"]*"|[^\s"]*)"#).expect("static pattern")
    })
}

/// Remove precompiled-header flags (`/Yu`, `/Yc`, `/Fp`), quoted or not.
///
/// Sources are preprocessed before shipping, so headers are already inlined.
pub fn strip_pch_flags(args: &str) -> String {
    pch_flag_pattern().replace_all(args, "").trim().to_string()
}

/// One compiler invocation in the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptGroup {
    /// File name of the compiler inside the toolchain directory
    pub compiler_name: String,
    pub args: String,
    /// Archive names of the sources, relative to the bundle root
    pub files: Vec<String>,
}

/// Batch script compiling every group of a task bundle
#[derive(Debug, Clone)]
pub struct RemoteScript {
    groups: Vec<ScriptGroup>,
    parallelism: usize,
}

impl RemoteScript {
    pub fn new(parallelism: usize) -> Self {
        Self {
            groups: Vec::new(),
            parallelism: parallelism.max(1),
        }
    }

    pub fn add_group(&mut self, group: ScriptGroup) {
        self.groups.push(group);
    }

    pub fn groups(&self) -> &[ScriptGroup] {
        &self.groups
    }

    /// Render with CRLF line endings
    pub fn render(&self) -> String {
        let toolchain = format!("..\\{}\\", TOOLCHAIN_DIR);
        let mut lines = vec![
            "@echo off".to_string(),
            "cd /d %~dp0".to_string(),
            format!("mkdir {}", OUTPUT_DIR),
        ];

        for group in &self.groups {
            let pdb_stem = group
                .files
                .first()
                .and_then(|f| Path::new(f).file_stem())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "batch".to_string());

            let mut line = format!("\"{}{}\"", toolchain, group.compiler_name);
            if !group.args.is_empty() {
                line.push(' ');
                line.push_str(&group.args);
            }
            line.push_str(&format!(
                " /FS /Fo\"{out}/\" /Fd\"{out}/{pdb_stem}.pdb\" /MP{mp}",
                out = OUTPUT_DIR,
                mp = self.parallelism
            ));
            for file in &group.files {
                line.push_str(&format!(" \"{}\"", file));
            }
            lines.push(line);
        }

        lines.push(format!(
            "powershell.exe -nologo -noprofile -command \"& {{ Add-Type -A 'System.IO.Compression.FileSystem'; \
             [IO.Compression.ZipFile]::CreateFromDirectory('{}', '{}'); }}\"",
            OUTPUT_DIR, OUTPUT_ARCHIVE
        ));
        lines.push(format!("\"{}{}\" -stop", toolchain, PDB_SERVER));
        lines.push("exit 0".to_string());

        let mut script = lines.join("\r\n");
        script.push_str("\r\n");
        script
    }
}
