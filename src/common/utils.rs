use nanoid::nanoid;

// ==========================================
// ID 生成工具 (Identity Utilities)
// ==========================================

const ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z',
];

/// 生成扩展实例的后缀 ID (NanoID)
///
/// 不包含 `-` 和 `_`，拼在扩展名后面仍然可以双击选中。
#[inline]
pub fn new_extension_id() -> String {
    nanoid!(8, &ALPHABET)
}

/// 生成宿主实例 ID，用于区分同一进程里的多个宿主
#[inline]
pub fn new_host_id() -> String {
    nanoid!(6, &ALPHABET)
}
