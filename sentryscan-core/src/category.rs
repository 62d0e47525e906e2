//! Function-name → category tables, shipped as embedded data rather than
//! code, so the mapping can evolve without touching the compiler or
//! projector.

use crate::types::{Category, Language};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Version identifier for the embedded mapping tables, included in
/// `Report.version` so reports are interpretable against the exact mapping
/// that produced them.
pub const CATEGORY_TABLE_VERSION: &str = "category-tables-v1";

type Table = &'static [(&'static str, Category)];

const PYTHON_TABLE: Table = &[
    ("open", Category::FilesystemAccess),
    ("os.remove", Category::FilesystemAccess),
    ("os.unlink", Category::FilesystemAccess),
    ("os.rename", Category::FilesystemAccess),
    ("os.rmdir", Category::FilesystemAccess),
    ("os.mkdir", Category::FilesystemAccess),
    ("os.makedirs", Category::FilesystemAccess),
    ("shutil.rmtree", Category::FilesystemAccess),
    ("shutil.copy", Category::FilesystemAccess),
    ("pathlib.path.unlink", Category::FilesystemAccess),
    ("requests.get", Category::NetworkHttpRequest),
    ("requests.post", Category::NetworkHttpRequest),
    ("requests.put", Category::NetworkHttpRequest),
    ("requests.session", Category::NetworkHttpRequest),
    ("urllib.request.urlopen", Category::NetworkHttpRequest),
    ("http.client.httpconnection", Category::NetworkHttpRequest),
    ("socket.socket", Category::SystemInteraction),
    ("subprocess.run", Category::ProcessManagement),
    ("subprocess.call", Category::ProcessManagement),
    ("subprocess.popen", Category::ProcessManagement),
    ("subprocess.check_output", Category::ProcessManagement),
    ("os.system", Category::ProcessManagement),
    ("os.popen", Category::ProcessManagement),
    ("os.exec", Category::ProcessManagement),
    ("os.execv", Category::ProcessManagement),
    ("os.execve", Category::ProcessManagement),
    ("os.spawnl", Category::ProcessManagement),
    ("pickle.loads", Category::Deserialization),
    ("pickle.load", Category::Deserialization),
    ("marshal.loads", Category::Deserialization),
    ("yaml.load", Category::Deserialization),
    ("base64.b64decode", Category::EncodingDecoding),
    ("base64.b64encode", Category::EncodingDecoding),
    ("base64.decodebytes", Category::EncodingDecoding),
    ("codecs.decode", Category::EncodingDecoding),
    ("codecs.encode", Category::EncodingDecoding),
    ("pip.main", Category::PackageInstallationExecution),
    ("importlib.import_module", Category::PackageInstallationExecution),
    ("__import__", Category::PackageInstallationExecution),
    ("os.symlink", Category::FsLinking),
    ("os.link", Category::FsLinking),
    ("os.environ", Category::SystemInteraction),
    ("os.getenv", Category::SystemInteraction),
    ("platform.system", Category::SystemInteraction),
    ("platform.uname", Category::SystemInteraction),
    ("input", Category::UserIo),
    ("print", Category::UserIo),
    ("sys.stdin.read", Category::UserIo),
    ("zipfile.zipfile", Category::ArchiveCompression),
    ("tarfile.open", Category::ArchiveCompression),
    ("shutil.make_archive", Category::ArchiveCompression),
    ("eval", Category::DynamicCodeExecution),
    ("exec", Category::DynamicCodeExecution),
    ("compile", Category::DynamicCodeExecution),
];

const JS_TABLE: Table = &[
    ("fs.readfile", Category::FilesystemAccess),
    ("fs.readfilesync", Category::FilesystemAccess),
    ("fs.writefile", Category::FilesystemAccess),
    ("fs.writefilesync", Category::FilesystemAccess),
    ("fs.unlink", Category::FilesystemAccess),
    ("fs.unlinksync", Category::FilesystemAccess),
    ("fs.rmdir", Category::FilesystemAccess),
    ("fs.mkdir", Category::FilesystemAccess),
    ("fetch", Category::NetworkHttpRequest),
    ("axios.get", Category::NetworkHttpRequest),
    ("axios.post", Category::NetworkHttpRequest),
    ("http.request", Category::NetworkHttpRequest),
    ("https.request", Category::NetworkHttpRequest),
    ("xmlhttprequest", Category::NetworkHttpRequest),
    ("child_process.exec", Category::ProcessManagement),
    ("child_process.execsync", Category::ProcessManagement),
    ("child_process.spawn", Category::ProcessManagement),
    ("child_process.spawnsync", Category::ProcessManagement),
    ("child_process.fork", Category::ProcessManagement),
    ("node-serialize.unserialize", Category::Deserialization),
    ("buffer.from", Category::EncodingDecoding),
    ("atob", Category::EncodingDecoding),
    ("btoa", Category::EncodingDecoding),
    ("fs.symlink", Category::FsLinking),
    ("fs.symlinksync", Category::FsLinking),
    ("fs.link", Category::FsLinking),
    ("process.env", Category::SystemInteraction),
    ("os.hostname", Category::SystemInteraction),
    ("readline.question", Category::UserIo),
    ("console.log", Category::UserIo),
    ("zlib.creategzip", Category::ArchiveCompression),
    ("adm-zip", Category::ArchiveCompression),
    ("eval", Category::DynamicCodeExecution),
    ("function", Category::DynamicCodeExecution),
    ("vm.runincontext", Category::DynamicCodeExecution),
    ("vm.runinnewcontext", Category::DynamicCodeExecution),
];

static PYTHON_MAP: LazyLock<HashMap<&'static str, Category>> =
    LazyLock::new(|| PYTHON_TABLE.iter().copied().collect());
static JS_MAP: LazyLock<HashMap<&'static str, Category>> =
    LazyLock::new(|| JS_TABLE.iter().copied().collect());

/// Looks up a (lower-cased, dotted) callee name against the per-language
/// category table. Returns `None` when the name carries no security
/// significance.
pub fn lookup(language: Language, dotted_name: &str) -> Option<Category> {
    let key = dotted_name.to_ascii_lowercase();
    let map = match language {
        Language::ScriptDynamic => &PYTHON_MAP,
        Language::ScriptCurly => &JS_MAP,
    };
    map.get(key.as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_python_sink() {
        assert_eq!(
            lookup(Language::ScriptDynamic, "os.system"),
            Some(Category::ProcessManagement)
        );
    }

    #[test]
    fn resolves_known_js_sink() {
        assert_eq!(
            lookup(Language::ScriptCurly, "child_process.exec"),
            Some(Category::ProcessManagement)
        );
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(lookup(Language::ScriptDynamic, "totally_benign_helper"), None);
    }
}
