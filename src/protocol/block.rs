//! 标记定界块提取
//!
//! 「定位 begin/end 标记、截取子串、尝试解码」的通用组合子，状态补丁与工具调用两种块共用。
//! begin 无配对 end 时整块保持原样；同一标记对出现第二次视为歧义，剥离但不解码、不合并。

/// 一种块的 begin/end 标记对
#[derive(Debug, Clone, Copy)]
pub struct BlockMarkers {
    pub begin: &'static str,
    pub end: &'static str,
}

/// 状态补丁块
pub const STATE_PATCH_MARKERS: BlockMarkers = BlockMarkers {
    begin: "<<<STATE_PATCH_JSON>>>",
    end: "<<<END_STATE_PATCH_JSON>>>",
};

/// 工具调用块
pub const TOOL_CALLS_MARKERS: BlockMarkers = BlockMarkers {
    begin: "<<<TOOL_CALLS_JSON>>>",
    end: "<<<END_TOOL_CALLS_JSON>>>",
};

/// 一次扫描的结果
#[derive(Debug, Clone)]
pub struct BlockScan {
    /// 剥离已识别块后的文本
    pub remaining: String,
    /// 第一个完整块的内部负载（已 trim）；无块或块不完整时为 None
    pub payload: Option<String>,
    /// 是否剥离了第二个同类块（解码歧义，负载被忽略）
    pub duplicate_stripped: bool,
}

/// 在 text 中查找一个完整块，返回 (负载, 块起点, 块终点)
fn find_block(text: &str, markers: &BlockMarkers) -> Option<(String, usize, usize)> {
    let start = text.find(markers.begin)?;
    let after_begin = start + markers.begin.len();
    let end_rel = text[after_begin..].find(markers.end)?;
    let end = after_begin + end_rel;
    let payload = text[after_begin..end].trim().to_string();
    Some((payload, start, end + markers.end.len()))
}

/// 扫描并剥离定界块：首个完整块产出负载；后续同类完整块一并剥离但忽略负载
pub fn scan_block(text: &str, markers: &BlockMarkers) -> BlockScan {
    let Some((payload, start, end)) = find_block(text, markers) else {
        return BlockScan {
            remaining: text.to_string(),
            payload: None,
            duplicate_stripped: false,
        };
    };

    let mut remaining = format!("{}{}", &text[..start], &text[end..]);
    let mut duplicate_stripped = false;
    while let Some((_ignored, dup_start, dup_end)) = find_block(&remaining, markers) {
        remaining = format!("{}{}", &remaining[..dup_start], &remaining[dup_end..]);
        duplicate_stripped = true;
    }

    BlockScan {
        remaining,
        payload: Some(payload),
        duplicate_stripped,
    }
}
